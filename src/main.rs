#[tokio::main]
async fn main() {
    bakery::start_server().await;
}
