//! Mock ChomikBox service: envelopes, folder pages and file bodies on one server.

#![allow(dead_code)]

use std::sync::Arc;

use chomikbox_core::protocol::{SOAP_ACTION_AUTH, SOAP_ACTION_DOWNLOAD};
use chomikbox_core::{Credentials, Endpoints, HttpTransport, Session};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER: &str = "chomikoryba";
pub const TOKEN: &str = "token-1";

/// A file the mock service knows about.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub id: &'static str,
    pub name: &'static str,
    pub body: &'static [u8],
}

impl RemoteFile {
    pub fn new(id: &'static str, name: &'static str, body: &'static [u8]) -> Self {
        Self { id, name, body }
    }

    pub fn file_path(&self) -> String {
        format!("/files/{}", self.id)
    }
}

pub fn endpoints(server: &MockServer) -> Endpoints {
    Endpoints::new(format!("{}/svc", server.uri()), format!("{}/", server.uri()))
}

pub fn session(server: &MockServer) -> Arc<Session> {
    Arc::new(
        Session::new(
            Arc::new(HttpTransport::new().expect("transport")),
            endpoints(server),
            Credentials::from_password(USER, "secret").expect("credentials"),
        ),
    )
}

pub fn site_url(server: &MockServer, path: &str) -> String {
    format!("{}/{}", server.uri(), path.trim_start_matches('/'))
}

pub async fn mount_auth(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/svc"))
        .and(header("SOAPAction", SOAP_ACTION_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<s:Envelope><s:Body><AuthResponse><AuthResult><a:status>Ok</a:status><a:token>{TOKEN}</a:token></AuthResult></AuthResponse></s:Body></s:Envelope>"
        )))
        .mount(server)
        .await;
}

pub fn resolution_body(files: &[RemoteFile]) -> String {
    let mut body = String::from(
        "<s:Envelope><s:Body><DownloadResponse><DownloadResult><a:list>",
    );
    for file in files {
        body.push_str(&format!(
            "<FileEntry><id>{}</id><agreementInfo><AgreementInfo><name>small</name><cost>0</cost></AgreementInfo></agreementInfo><realId>{}</realId><name>{}</name><size>{}</size></FileEntry>",
            file.id,
            file.id,
            file.name,
            file.body.len()
        ));
    }
    body.push_str("</a:list></DownloadResult></DownloadResponse></s:Body></s:Envelope>");
    body
}

/// Answers the resolution envelope that carries `lookup_key`.
pub async fn mount_resolution(server: &MockServer, lookup_key: &str, files: &[RemoteFile]) {
    Mock::given(method("POST"))
        .and(path("/svc"))
        .and(header("SOAPAction", SOAP_ACTION_DOWNLOAD))
        .and(body_string_contains(format!("<id>{lookup_key}</id>")))
        .respond_with(ResponseTemplate::new(200).set_body_string(resolution_body(files)))
        .mount(server)
        .await;
}

/// Answers the planning envelope for `file` with a link to `/files/{id}`.
pub async fn mount_plan(server: &MockServer, remote_path: &str, file: &RemoteFile) {
    let url = format!("{}{}", server.uri(), file.file_path());
    mount_plan_with_url(server, remote_path, file, Some(&url)).await;
}

pub async fn mount_plan_with_url(
    server: &MockServer,
    remote_path: &str,
    file: &RemoteFile,
    url: Option<&str>,
) {
    let url_element = match url {
        Some(url) => format!("<url>{}</url>", url.replace('&', "&amp;")),
        None => r#"<url i:nil="true"/>"#.to_string(),
    };
    let body = format!(
        "<s:Envelope><s:Body><DownloadResponse><DownloadResult><globalId>/{remote_path}</globalId><a:list><FileEntry><id>{}</id><realId>{}</realId><name>{}</name><size>{}</size>{url_element}</FileEntry></a:list></DownloadResult></DownloadResponse></s:Body></s:Envelope>",
        file.id,
        file.id,
        file.name,
        file.body.len(),
    );
    Mock::given(method("POST"))
        .and(path("/svc"))
        .and(header("SOAPAction", SOAP_ACTION_DOWNLOAD))
        .and(body_string_contains(format!("<id>{}</id><agreementInfo>", file.id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

pub async fn mount_file(server: &MockServer, file: &RemoteFile) {
    Mock::given(method("GET"))
        .and(path(file.file_path()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(file.body.to_vec()))
        .mount(server)
        .await;
}

/// Serves a folder page whose folder list links to `subfolders` (site-relative).
pub async fn mount_folder_page(server: &MockServer, page_path: &str, subfolders: &[&str]) {
    let links: String = subfolders
        .iter()
        .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
        .collect::<Vec<_>>()
        .join("\n");
    let html = format!(
        "<html><body><div id=\"foldersList\">\n{links}\n</div><div id=\"fileList\"></div></body></html>"
    );
    Mock::given(method("GET"))
        .and(path(page_path.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(html))
        .mount(server)
        .await;
}

/// Mounts everything needed to download `files` from the folder at `folder`.
pub async fn mount_folder(server: &MockServer, folder: &str, files: &[RemoteFile]) {
    mount_resolution(server, folder, files).await;
    for file in files {
        mount_plan(server, folder.trim_start_matches('/'), file).await;
        mount_file(server, file).await;
    }
}

/// Bodies of every Download envelope the server received, in order.
pub async fn download_envelopes(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| {
            request
                .headers
                .get("SOAPAction")
                .is_some_and(|value| value.as_bytes() == SOAP_ACTION_DOWNLOAD.as_bytes())
        })
        .map(|request| String::from_utf8_lossy(&request.body).into_owned())
        .collect()
}

pub async fn auth_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| {
            request
                .headers
                .get("SOAPAction")
                .is_some_and(|value| value.as_bytes() == SOAP_ACTION_AUTH.as_bytes())
        })
        .count()
}
