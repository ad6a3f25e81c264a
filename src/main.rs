fn main() {
    if let Err(e) = rodesign_rs::adapters::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
