fn main() {
    uplift_lib::run()
}
