fn main() {
    if let Err(err) = cqlmap::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
