#[macro_use]
extern crate log;

use clap::Parser;
use wl_common::config::Config;
use wl_server::{net::ConnectionManager, server::GameServer};

#[derive(Parser, Debug)]
#[clap(about, version, author)]
struct Args {
  /// Path to the server config. The full default config is written to
  /// `server-default.toml` on startup as a reference.
  #[clap(long, default_value = "server.toml")]
  config: String,
}

fn main() {
  let args = Args::parse();
  let config = Config::new(&args.config, "server-default.toml", include_str!("default.toml"));

  let level = config.get("log-level");
  wl_common::init_with_level("server", level);

  let addr = match config.get::<String>("address").parse() {
    Ok(v) => v,
    Err(e) => {
      error!("invalid address: {e}");
      return;
    }
  };

  let server = GameServer::new(config);
  let mut conn = ConnectionManager::new(server.clone());

  info!("listening on {}", addr);
  match conn.run(addr) {
    Ok(_) => {}
    Err(e) => error!("error in connection: {e}"),
  }
  server.stop();
}
