fn main() {
    env_logger::init();

    if let Err(err) = framelink::run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
