fn main() {
    stardeck_lib::run()
}
