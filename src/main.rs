// src/main.rs

use scandag::{cli, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("scandag error: {err:?}");
        std::process::exit(1);
    }
    std::process::exit(run(args).await);
}
