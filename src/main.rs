#[tokio::main]
async fn main() {
    if let Err(e) = careconnect_lib::run().await {
        eprintln!("careconnect: {e}");
        std::process::exit(1);
    }
}
