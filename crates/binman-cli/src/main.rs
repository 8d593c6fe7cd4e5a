//! `binman` entrypoint.

#[tokio::main]
async fn main() {
    std::process::exit(binman_cli::run().await);
}
