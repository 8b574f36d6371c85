//! Plugin entry point. The host launches this binary and reads the
//! handshake line from stdout.

use rest_api_provider::{init_logging, serve, RestApiProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    serve(RestApiProvider::default()).await
}
