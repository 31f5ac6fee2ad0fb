pub mod auth;
pub mod check;
pub mod init;
pub mod status;
pub mod watch;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Write a configuration file
    Init(init::InitArgs),
    /// Authorize Google Drive access in the browser
    Auth(auth::AuthArgs),
    /// Watch tracked files and send notifications until interrupted
    Watch(watch::WatchArgs),
    /// Run a single poll cycle and exit
    Check(check::CheckArgs),
    /// Show stored state without contacting Google
    Status(status::StatusArgs),
}
