//! Multi-step workflows composed from session operations.
//!
//! `deploy_app`: ping → login → delete app → create app →
//! per file {create resource → upload → close ticket} → set default page →
//! browse → logout. The first failing step aborts; completed steps stay
//! on the device (no rollback).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::client::{read_source, save_download, ResourceInfo, TicketId, WebApiSession};
use crate::error::ApiError;
use crate::media::media_type_for;

/// What to deploy and where.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub app_name: String,
    /// Every regular file directly inside becomes one resource
    pub source_dir: PathBuf,
    pub default_page: String,
    /// Browse apps/resources after deploying
    pub verify: bool,
}

/// One resource that made it through create → upload → close.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedResource {
    pub name: String,
    pub media_type: String,
    pub bytes: u64,
    pub blake3: String,
    pub ticket: TicketId,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub app: String,
    pub uploaded: Vec<UploadedResource>,
    pub default_page: String,
    /// Resources the device lists after the deploy (when verifying)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceInfo>>,
}

/// The step a deploy stopped at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployStep {
    ReadSource,
    Ping,
    Login,
    DeleteApp,
    CreateApp,
    CreateResource(String),
    Upload(String),
    CloseTicket(String),
    SetDefaultPage,
    Verify,
    Logout,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadSource => write!(f, "read source directory"),
            Self::Ping => write!(f, "ping"),
            Self::Login => write!(f, "login"),
            Self::DeleteApp => write!(f, "delete app"),
            Self::CreateApp => write!(f, "create app"),
            Self::CreateResource(name) => write!(f, "create resource '{name}'"),
            Self::Upload(name) => write!(f, "upload '{name}'"),
            Self::CloseTicket(name) => write!(f, "close ticket for '{name}'"),
            Self::SetDefaultPage => write!(f, "set default page"),
            Self::Verify => write!(f, "verify"),
            Self::Logout => write!(f, "logout"),
        }
    }
}

/// A deploy that stopped early, with whatever was uploaded before it.
#[derive(Debug)]
pub struct DeployFailure {
    pub step: DeployStep,
    pub error: ApiError,
    pub uploaded: Vec<UploadedResource>,
}

impl fmt::Display for DeployFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

impl std::error::Error for DeployFailure {}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_source_files(dir: &Path) -> Result<Vec<PathBuf>, ApiError> {
    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ApiError::FileNotFound(dir.to_path_buf()),
        _ => ApiError::Io(format!("cannot list {}: {}", dir.display(), e)),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ApiError::Io(e.to_string()))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Deploy a directory as a web application.
///
/// Logs in only if the session holds no token, and then logs out again
/// before returning (also after a failure).
pub fn deploy_app(session: &mut WebApiSession, plan: &DeployPlan) -> Result<DeployReport, DeployFailure> {
    let fail = |step: DeployStep, error: ApiError| DeployFailure { step, error, uploaded: Vec::new() };

    let files = list_source_files(&plan.source_dir).map_err(|e| fail(DeployStep::ReadSource, e))?;

    if !session.ping() {
        return Err(fail(
            DeployStep::Ping,
            ApiError::Transport(format!("device {} unreachable", session.config().host)),
        ));
    }

    let owns_login = !session.is_authenticated();
    if owns_login {
        session.login().map_err(|e| fail(DeployStep::Login, e))?;
    }

    let outcome = deploy_steps(session, plan, &files);

    if owns_login {
        if let Err(e) = session.logout() {
            log::warn!("logout after deploy failed: {}", e);
            if outcome.is_ok() {
                return Err(fail(DeployStep::Logout, e));
            }
        }
    }
    outcome
}

fn deploy_steps(
    session: &mut WebApiSession,
    plan: &DeployPlan,
    files: &[PathBuf],
) -> Result<DeployReport, DeployFailure> {
    let app = plan.app_name.as_str();
    let mut uploaded = Vec::new();

    match session.delete_app(app) {
        Ok(()) => log::info!("deleted existing app '{}'", app),
        Err(e) if e.is_not_found() => log::debug!("app '{}' did not exist", app),
        Err(error) => return Err(DeployFailure { step: DeployStep::DeleteApp, error, uploaded }),
    }

    if let Err(error) = session.create_app(app) {
        return Err(DeployFailure { step: DeployStep::CreateApp, error, uploaded });
    }
    log::info!("created app '{}'", app);

    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match upload_resource(session, app, &name, path) {
            Ok(resource) => {
                log::info!("uploaded {} ({} bytes, {})", resource.name, resource.bytes, resource.media_type);
                uploaded.push(resource);
            }
            Err((step, error)) => return Err(DeployFailure { step, error, uploaded }),
        }
    }

    if let Err(error) = session.set_default_page(app, &plan.default_page) {
        return Err(DeployFailure { step: DeployStep::SetDefaultPage, error, uploaded });
    }

    let resources = if plan.verify {
        let listed = session
            .browse_apps()
            .and_then(|apps| {
                if apps.iter().any(|a| a.name == app) {
                    Ok(())
                } else {
                    Err(ApiError::Protocol(format!("app '{}' missing after deploy", app)))
                }
            })
            .and_then(|()| session.browse_resources(app));
        match listed {
            Ok(resources) => Some(resources),
            Err(error) => return Err(DeployFailure { step: DeployStep::Verify, error, uploaded }),
        }
    } else {
        None
    };

    Ok(DeployReport {
        app: app.to_string(),
        uploaded,
        default_page: plan.default_page.clone(),
        resources,
    })
}

/// create resource → upload → close ticket for one file.
///
/// A ticket that was issued is closed exactly once, also when the upload
/// failed; the upload error is the one reported.
fn upload_resource(
    session: &mut WebApiSession,
    app: &str,
    name: &str,
    path: &Path,
) -> Result<UploadedResource, (DeployStep, ApiError)> {
    let data = read_source(path).map_err(|e| (DeployStep::Upload(name.to_string()), e))?;
    let bytes = data.len() as u64;
    let digest = format!("blake3:{}", blake3::hash(&data).to_hex());

    let ticket = session
        .create_resource(app, name)
        .map_err(|e| (DeployStep::CreateResource(name.to_string()), e))?;

    if let Err(e) = session.upload_bytes(&ticket, data) {
        if let Err(close_err) = session.close_ticket(&ticket) {
            log::warn!("closing ticket {} after failed upload: {}", ticket, close_err);
        }
        return Err((DeployStep::Upload(name.to_string()), e));
    }

    session
        .close_ticket(&ticket)
        .map_err(|e| (DeployStep::CloseTicket(name.to_string()), e))?;

    Ok(UploadedResource {
        name: name.to_string(),
        media_type: media_type_for(name).to_string(),
        bytes,
        blake3: digest,
        ticket,
    })
}

/// Fetch one user file: Files.Download → GET ticket → close ticket → save.
pub fn download_user_file(
    session: &mut WebApiSession,
    resource: &str,
    dest_dir: &Path,
) -> Result<PathBuf, ApiError> {
    let ticket = session.request_file_download(resource)?;
    let downloaded = session.download_file(&ticket);
    let closed = session.close_ticket(&ticket);

    let file = downloaded?;
    closed?;
    let path = save_download(dest_dir, &file)?;
    log::info!("downloaded {} to {} ({} bytes)", resource, path.display(), file.bytes.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::testing::{rpc_error, rpc_ok, RecordingTransport, Scripted};
    use crate::transport::HttpReply;
    use serde_json::json;

    fn session(transport: &RecordingTransport) -> WebApiSession {
        WebApiSession::with_transport(SessionConfig::new("plc", "admin", "secret"), transport.clone())
    }

    fn source_dir(files: &[(&str, &[u8])]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, data) in files {
            std::fs::write(dir.path().join(name), data).unwrap();
        }
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        dir
    }

    fn plan(dir: &Path, verify: bool) -> DeployPlan {
        DeployPlan {
            app_name: "TestApp".into(),
            source_dir: dir.to_path_buf(),
            default_page: "index.html".into(),
            verify,
        }
    }

    fn ok_upload() -> Scripted {
        Scripted::Raw(Ok(HttpReply { status: 200, ..Default::default() }))
    }

    #[test]
    fn test_full_deploy_sequence() {
        let dir = source_dir(&[("index.html", b"<html></html>"), ("app.js", b"1;")]);
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({})));
        transport.push(rpc_ok(json!({ "token": "tok" })));
        transport.push(rpc_error(1101, "Application does not exist"));
        transport.push(rpc_ok(json!(true)));
        // app.js sorts first
        transport.push(rpc_ok(json!("T1")));
        transport.push(ok_upload());
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!("T2")));
        transport.push(ok_upload());
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!({ "applications": [{ "name": "TestApp" }] })));
        transport.push(rpc_ok(json!({ "resources": [{ "name": "app.js" }, { "name": "index.html" }] })));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        let report = deploy_app(&mut s, &plan(dir.path(), true)).unwrap();

        assert_eq!(
            transport.methods(),
            vec![
                "Api.Ping", "Api.Login", "WebApp.Delete", "WebApp.Create",
                "WebApp.CreateResource", "upload", "Api.CloseTicket",
                "WebApp.CreateResource", "upload", "Api.CloseTicket",
                "WebApp.SetDefaultPage", "WebApp.Browse", "WebApp.BrowseResources",
                "Api.Logout",
            ]
        );
        assert_eq!(report.uploaded.len(), 2);
        assert_eq!(report.uploaded[0].name, "app.js");
        assert_eq!(report.uploaded[0].ticket.as_str(), "T1");
        assert_eq!(report.uploaded[1].media_type, "text/html");
        assert_eq!(report.uploaded[1].bytes, 13);
        assert_eq!(report.resources.as_ref().map(Vec::len), Some(2));
        assert!(s.token().is_none());
    }

    #[test]
    fn test_failed_ping_makes_no_further_calls() {
        let dir = source_dir(&[("index.html", b"x")]);
        let transport = RecordingTransport::new();
        transport.push(Scripted::Raw(Err(ApiError::Transport("no route to host".into()))));

        let mut s = session(&transport);
        let failure = deploy_app(&mut s, &plan(dir.path(), false)).unwrap_err();
        assert_eq!(failure.step, DeployStep::Ping);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_missing_source_dir_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::new();
        let mut s = session(&transport);

        let failure = deploy_app(&mut s, &plan(&dir.path().join("missing"), false)).unwrap_err();
        assert_eq!(failure.step, DeployStep::ReadSource);
        assert!(matches!(failure.error, ApiError::FileNotFound(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_failed_login_stops_deploy() {
        let dir = source_dir(&[("index.html", b"x")]);
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({})));
        transport.push(rpc_error(100, "Login failed"));

        let mut s = session(&transport);
        let failure = deploy_app(&mut s, &plan(dir.path(), false)).unwrap_err();
        assert_eq!(failure.step, DeployStep::Login);
        assert!(matches!(failure.error, ApiError::AuthFailure(_)));
        assert_eq!(transport.methods(), vec!["Api.Ping", "Api.Login"]);
    }

    #[test]
    fn test_delete_error_other_than_not_found_aborts() {
        let dir = source_dir(&[("index.html", b"x")]);
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({})));
        transport.push(rpc_ok(json!({ "token": "tok" })));
        transport.push(rpc_error(2, "Permission denied"));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        let failure = deploy_app(&mut s, &plan(dir.path(), false)).unwrap_err();
        assert_eq!(failure.step, DeployStep::DeleteApp);
        assert_eq!(
            transport.methods(),
            vec!["Api.Ping", "Api.Login", "WebApp.Delete", "Api.Logout"]
        );
    }

    #[test]
    fn test_failed_upload_closes_ticket_and_aborts() {
        let dir = source_dir(&[("a.html", b"a"), ("b.html", b"b")]);
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({})));
        transport.push(rpc_ok(json!({ "token": "tok" })));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!("T1")));
        transport.push(Scripted::Raw(Ok(HttpReply { status: 500, ..Default::default() })));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        let failure = deploy_app(&mut s, &plan(dir.path(), false)).unwrap_err();

        assert_eq!(failure.step, DeployStep::Upload("a.html".into()));
        assert!(matches!(failure.error, ApiError::Http(500, _)));
        assert!(failure.uploaded.is_empty());
        assert_eq!(
            transport.methods(),
            vec![
                "Api.Ping", "Api.Login", "WebApp.Delete", "WebApp.Create",
                "WebApp.CreateResource", "upload", "Api.CloseTicket", "Api.Logout",
            ]
        );
    }

    #[test]
    fn test_existing_token_is_reused_and_kept() {
        let dir = source_dir(&[("index.html", b"x")]);
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({})));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!("T1")));
        transport.push(ok_upload());
        transport.push(rpc_ok(json!(true)));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        s.set_token("saved");
        let report = deploy_app(&mut s, &plan(dir.path(), false)).unwrap();

        assert_eq!(report.uploaded.len(), 1);
        assert!(report.resources.is_none());
        assert!(!transport.methods().iter().any(|m| m == "Api.Login" || m == "Api.Logout"));
        assert_eq!(s.token(), Some("saved"));
    }

    #[test]
    fn test_download_user_file() {
        let dest = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({ "token": "tok" })));
        transport.push(rpc_ok(json!("D1")));
        transport.push(Scripted::Raw(Ok(HttpReply {
            status: 200,
            headers: vec![("Content-Disposition".into(), "attachment; filename=\"notes.txt\"".into())],
            body: b"remember".to_vec(),
        })));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        s.login().unwrap();
        let path = download_user_file(&mut s, "/UserFiles/notes.txt", dest.path()).unwrap();

        assert_eq!(path, dest.path().join("notes.txt"));
        assert_eq!(std::fs::read(&path).unwrap(), b"remember");
        assert_eq!(
            transport.methods(),
            vec!["Api.Login", "Files.Download", "download", "Api.CloseTicket"]
        );
    }

    #[test]
    fn test_download_closes_ticket_when_header_missing() {
        let dest = tempfile::tempdir().unwrap();
        let transport = RecordingTransport::new();
        transport.push(rpc_ok(json!({ "token": "tok" })));
        transport.push(rpc_ok(json!("D1")));
        transport.push(Scripted::Raw(Ok(HttpReply { status: 200, body: b"x".to_vec(), ..Default::default() })));
        transport.push(rpc_ok(json!(true)));

        let mut s = session(&transport);
        s.login().unwrap();
        let err = download_user_file(&mut s, "/UserFiles/notes.txt", dest.path()).unwrap_err();

        assert!(matches!(err, ApiError::Protocol(_)));
        assert_eq!(transport.methods().last().map(String::as_str), Some("Api.CloseTicket"));
    }
}
