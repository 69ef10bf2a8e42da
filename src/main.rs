#[tokio::main]
async fn main() {
  // Minimal CLI: support --version/-V
  let mut args = std::env::args().skip(1);
  if let Some(arg) = args.next() {
    if arg == "--version" || arg == "-V" {
      println!("mailsender {}", env!("CARGO_PKG_VERSION"));
      return;
    }
    if arg == "--help" || arg == "-h" {
      eprintln!("Usage: mailsender [--version]");
      eprintln!("Configuration is read from MAILSENDER_CONFIG (JSON).");
      return;
    }
  }

  if let Err(e) = mailsender::app::run().await {
    eprintln!("error: {e}");
    std::process::exit(1);
  }
}
