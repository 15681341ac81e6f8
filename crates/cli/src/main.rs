// plcweb - PLC Web API command line
// Ping, login, web application deploys, ticket-based file downloads.

mod commands;
mod exit_codes;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use plcweb_client::ApiError;

use exit_codes::{api_exit_code, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "plcweb")]
#[command(about = "Manage web applications and files on a PLC through its Web API")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    /// Emit JSON on stdout (default when stdout is not a terminal)
    #[arg(long, global = true)]
    json: bool,

    /// Log every request and response to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Device connection options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Device host or IP address
    #[arg(long, env = "PLCWEB_HOST", global = true)]
    pub host: Option<String>,

    /// Web API user
    #[arg(long = "user", env = "PLCWEB_USER", global = true)]
    pub username: Option<String>,

    /// Web API password
    #[arg(long, env = "PLCWEB_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Accept self-signed device certificates
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Profile file (default: ~/.config/plcweb/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Override https://{host} (test servers, proxies)
    #[arg(long, env = "PLCWEB_BASE_URL", hide = true, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the device answers
    Ping,

    /// Log in and save the session token for later commands
    Login,

    /// Log out and forget the saved token
    Logout,

    /// List web applications
    Apps,

    /// List the resources of a web application
    Resources {
        /// Web application name
        app: String,
    },

    /// List open transfer tickets
    Tickets,

    /// Replace a web application with the files of a directory
    #[command(after_help = "\
Examples:
  plcweb deploy web_files --app TestApp --host 192.168.0.1 --insecure
  plcweb deploy dist --app Dashboard --default-page main.html --no-verify")]
    Deploy {
        /// Directory whose regular files become the app's resources
        dir: PathBuf,

        /// Web application name
        #[arg(long)]
        app: String,

        /// Resource served at the application root
        #[arg(long, default_value = "index.html")]
        default_page: String,

        /// Skip listing the app's resources after the deploy
        #[arg(long)]
        no_verify: bool,
    },

    /// Delete a web application
    DeleteApp {
        /// Web application name
        name: String,

        /// Succeed if the application does not exist
        #[arg(long)]
        ignore_missing: bool,
    },

    /// Browse the device's user files
    Files {
        /// Path to browse
        #[arg(default_value = "/")]
        path: String,
    },

    /// Download a user file (e.g. /UserFiles/notes.txt)
    Download {
        /// Path of the file on the device
        resource: String,

        /// Destination directory
        #[arg(long, short = 'o', default_value = ".")]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = cli.json || !atty::is(atty::Stream::Stdout);
    let conn = cli.conn;

    let result = match cli.command {
        Commands::Ping => commands::cmd_ping(&conn, json),
        Commands::Login => commands::cmd_login(&conn),
        Commands::Logout => commands::cmd_logout(&conn),
        Commands::Apps => commands::cmd_apps(&conn, json),
        Commands::Resources { app } => commands::cmd_resources(&conn, &app, json),
        Commands::Tickets => commands::cmd_tickets(&conn, json),
        Commands::Deploy { dir, app, default_page, no_verify } => {
            commands::cmd_deploy(&conn, dir, app, default_page, !no_verify, json)
        }
        Commands::DeleteApp { name, ignore_missing } => commands::cmd_delete_app(&conn, &name, ignore_missing),
        Commands::Files { path } => commands::cmd_files(&conn, &path),
        Commands::Download { resource, output } => commands::cmd_download(&conn, &resource, &output, json),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// stderr subscriber; `log` records from the client are bridged in.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "plcweb_client=debug,plcweb=debug"
    } else {
        "plcweb_client=info,plcweb=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    /// Create error from a client error with the registered exit code.
    pub fn api(err: ApiError) -> Self {
        let code = api_exit_code(&err);
        let hint = match &err {
            ApiError::Transport(_) => Some("check --host and that the Web API is enabled on the device".to_string()),
            ApiError::AuthFailure(_) => Some("check --user / PLCWEB_PASSWORD".to_string()),
            ApiError::NotAuthenticated => Some("run `plcweb login` first".to_string()),
            ApiError::Rpc { .. } if err.is_not_found() => Some("the named app or file does not exist".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        CliError::api(err)
    }
}
