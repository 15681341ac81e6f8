//! Device commands.
//!
//! - `plcweb ping`: liveness check, no credentials needed
//! - `plcweb login`: log in, save token per host
//! - `plcweb logout`: end the saved session
//! - `plcweb deploy`: delete + recreate a web app from a directory
//! - `plcweb download`: fetch a user file through a ticket
//!
//! Listing commands reuse a saved token when there is one; otherwise they
//! log in for the duration of the command and log out again.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use plcweb_client::{
    ApiError, DeployPlan, SavedToken, SessionConfig, WebApiSession,
    deploy_app, download_user_file, load_profile, load_profile_at,
    load_token, save_token, delete_token,
};

use crate::{CliError, ConnectionArgs};
use crate::exit_codes::*;

// ── Session setup ───────────────────────────────────────────────────

/// Merge flags over the profile file. Flags win.
fn resolve_config(conn: &ConnectionArgs) -> Result<SessionConfig, CliError> {
    let profile = match &conn.config {
        Some(path) => load_profile_at(path),
        None => load_profile(),
    }
    .map_err(CliError::api)?;

    let host = conn.host.clone()
        .or(profile.host)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| CliError::usage("No device host given")
            .with_hint("pass --host or set PLCWEB_HOST"))?;

    let mut config = SessionConfig::new(
        host,
        conn.username.clone().or(profile.username).unwrap_or_default(),
        conn.password.clone().unwrap_or_default(),
    )
    .insecure(conn.insecure || profile.insecure_skip_verify.unwrap_or(false));

    if let Some(secs) = conn.timeout.or(profile.timeout_secs) {
        config.timeout_secs = secs;
    }
    if let Some(base) = &conn.base_url {
        config = config.with_base_url(base.clone());
    }
    Ok(config)
}

fn require_credentials(config: &SessionConfig) -> Result<(), CliError> {
    if config.username.is_empty() || config.password.is_empty() {
        return Err(CliError::usage("Missing credentials")
            .with_hint("pass --user and --password, or set PLCWEB_USER / PLCWEB_PASSWORD"));
    }
    Ok(())
}

fn open_session(conn: &ConnectionArgs) -> Result<WebApiSession, CliError> {
    let config = resolve_config(conn)?;
    let mut session = WebApiSession::new(config)?;
    if let Some(saved) = load_token(&session.config().host) {
        tracing::debug!("using token saved {}", saved.saved_at);
        session.set_token(saved.token);
    }
    Ok(session)
}

/// Run `f` with an authenticated session; log in (and out) only if no
/// token was saved.
fn with_session<T>(
    conn: &ConnectionArgs,
    f: impl FnOnce(&mut WebApiSession) -> Result<T, ApiError>,
) -> Result<T, CliError> {
    let mut session = open_session(conn)?;
    let owns_login = !session.is_authenticated();
    if owns_login {
        require_credentials(session.config())?;
        session.login().map_err(CliError::api)?;
    }

    let outcome = f(&mut session);

    if owns_login {
        if let Err(e) = session.logout() {
            tracing::warn!("logout failed: {}", e);
        }
    }

    outcome.map_err(|e| expired_token_hint(CliError::api(e), !owns_login))
}

/// A device error while reusing a saved token usually means it expired.
fn expired_token_hint(err: CliError, reused_token: bool) -> CliError {
    if reused_token && err.code == EXIT_RPC {
        err.with_hint("the saved token may have expired; run `plcweb login` again")
    } else {
        err
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })?;
    println!("{}", text);
    Ok(())
}

fn write_lines(lines: impl IntoIterator<Item = String>) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for line in lines {
        writeln!(handle, "{}", line)
            .map_err(|e| CliError { code: EXIT_ERROR, message: e.to_string(), hint: None })?;
    }
    Ok(())
}

// ── Ping / login / logout ───────────────────────────────────────────

pub fn cmd_ping(conn: &ConnectionArgs, json: bool) -> Result<(), CliError> {
    let mut session = open_session(conn)?;
    let host = session.config().host.clone();
    let reachable = session.ping();

    if json {
        print_json(&serde_json::json!({ "host": host, "reachable": reachable }))?;
    } else if reachable {
        println!("{} is reachable", host);
    }

    if reachable {
        Ok(())
    } else {
        Err(CliError {
            code: EXIT_UNREACHABLE,
            message: format!("{} did not answer Api.Ping", host),
            hint: Some("check --host, --insecure, and that the Web API is enabled".into()),
        })
    }
}

pub fn cmd_login(conn: &ConnectionArgs) -> Result<(), CliError> {
    let config = resolve_config(conn)?;
    require_credentials(&config)?;
    let mut session = WebApiSession::new(config)?;

    let token = session.login()?;
    let host = session.config().host.clone();

    save_token(&SavedToken::new(host.clone(), token))
        .map_err(|e| CliError { code: EXIT_LOCAL_FILE, message: e, hint: None })?;

    eprintln!("Logged in to {} as {}", host, session.config().username);
    Ok(())
}

pub fn cmd_logout(conn: &ConnectionArgs) -> Result<(), CliError> {
    let mut session = open_session(conn)?;
    let host = session.config().host.clone();
    if !session.is_authenticated() {
        return Err(CliError::api(ApiError::NotAuthenticated));
    }

    let outcome = session.logout();
    delete_token(&host)
        .map_err(|e| CliError { code: EXIT_LOCAL_FILE, message: e, hint: None })?;

    match outcome {
        Ok(()) => {
            eprintln!("Logged out of {}", host);
            Ok(())
        }
        Err(e) => Err(CliError::api(e)
            .with_hint(format!("the saved token for {} was removed locally anyway", host))),
    }
}

// ── Listings ────────────────────────────────────────────────────────

pub fn cmd_apps(conn: &ConnectionArgs, json: bool) -> Result<(), CliError> {
    let apps = with_session(conn, |s| s.browse_apps())?;
    if json {
        return print_json(&apps);
    }
    write_lines(apps.iter().map(|a| {
        format!(
            "{}\t{}\t{}",
            a.name,
            a.state.as_deref().unwrap_or("-"),
            a.default_page.as_deref().unwrap_or("-"),
        )
    }))
}

pub fn cmd_resources(conn: &ConnectionArgs, app: &str, json: bool) -> Result<(), CliError> {
    let resources = with_session(conn, |s| s.browse_resources(app))?;
    if json {
        return print_json(&resources);
    }
    write_lines(resources.iter().map(|r| {
        format!(
            "{}\t{}\t{}\t{}",
            r.name,
            r.media_type.as_deref().unwrap_or("-"),
            r.size.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            r.last_modified.as_deref().unwrap_or("-"),
        )
    }))
}

pub fn cmd_tickets(conn: &ConnectionArgs, json: bool) -> Result<(), CliError> {
    let tickets = with_session(conn, |s| s.browse_tickets())?;
    if json {
        return print_json(&tickets);
    }
    write_lines(tickets.iter().map(|t| {
        format!(
            "{}\t{}\t{}",
            t.id,
            t.provider.as_deref().unwrap_or("-"),
            t.state.as_deref().unwrap_or("-"),
        )
    }))
}

pub fn cmd_files(conn: &ConnectionArgs, path: &str) -> Result<(), CliError> {
    let listing = with_session(conn, |s| s.browse_files(path))?;
    print_json(&listing)
}

// ── Mutations ───────────────────────────────────────────────────────

pub fn cmd_delete_app(conn: &ConnectionArgs, name: &str, ignore_missing: bool) -> Result<(), CliError> {
    let outcome = with_session(conn, |s| match s.delete_app(name) {
        Err(e) if ignore_missing && e.is_not_found() => Ok(false),
        other => other.map(|()| true),
    })?;

    if outcome {
        eprintln!("Deleted {}", name);
    } else {
        eprintln!("{} did not exist", name);
    }
    Ok(())
}

pub fn cmd_deploy(
    conn: &ConnectionArgs,
    dir: PathBuf,
    app: String,
    default_page: String,
    verify: bool,
    json: bool,
) -> Result<(), CliError> {
    let mut session = open_session(conn)?;
    let reused_token = session.is_authenticated();
    if !reused_token {
        require_credentials(session.config())?;
    }

    let plan = DeployPlan { app_name: app, source_dir: dir, default_page, verify };
    let report = deploy_app(&mut session, &plan).map_err(|failure| {
        let uploaded = failure.uploaded.len();
        let step = failure.step.to_string();
        let mut err = expired_token_hint(CliError::api(failure.error), reused_token);
        err.message = format!("{} failed: {}", step, err.message);
        if uploaded > 0 && err.hint.is_none() {
            err.hint = Some(format!("{} resource(s) were uploaded before the failure", uploaded));
        }
        err
    })?;

    if json {
        return print_json(&report);
    }

    for r in &report.uploaded {
        eprintln!("  {} ({} bytes, {})", r.name, r.bytes, r.media_type);
    }
    eprintln!(
        "Deployed {} resource(s) to '{}' (default page {})",
        report.uploaded.len(),
        report.app,
        report.default_page,
    );
    Ok(())
}

pub fn cmd_download(conn: &ConnectionArgs, resource: &str, output: &Path, json: bool) -> Result<(), CliError> {
    if !output.is_dir() {
        return Err(CliError::usage(format!("Not a directory: {}", output.display())));
    }

    let path = with_session(conn, |s| download_user_file(s, resource, output))?;
    if json {
        return print_json(&serde_json::json!({ "resource": resource, "path": path }));
    }
    println!("{}", path.display());
    Ok(())
}
