use circuit_shell::pool::Fatal;
use env_logger::Env;

mod app;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let res = app::run().await;
    if let Err(err) = res {
        eprintln!("Error: {}", err);
        let code = err.downcast_ref::<Fatal>().map_or(1, Fatal::exit_code);
        std::process::exit(code);
    }
}
