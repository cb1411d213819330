//! ONVIF PTZ Client
//!
//! SOAP 1.2 client for the device, media and PTZ services.
//! Authenticates with a WS-Security UsernameToken digest whose `Created`
//! stamp follows the camera clock (offset learned at connect time).

use super::device::{PtzConnector, PtzDevice};
use super::types::{MediaProfile, PtzStatus, Velocity};
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use reqwest::Client;
use roxmltree::{Document, Node};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use std::time::Duration;

const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
const NS_PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

/// ONVIF control session
pub struct OnvifClient {
    /// Device service endpoint (e.g. http://192.168.x.x:2020/onvif/device_service)
    device_url: String,
    media_url: String,
    ptz_url: String,
    username: String,
    password: String,
    /// Camera clock minus local clock
    clock_offset: TimeDelta,
    client: Client,
}

impl OnvifClient {
    /// Create a client using the conventional service paths
    pub fn new(device_url: &str, username: &str, password: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            device_url: device_url.to_string(),
            media_url: service_url(device_url, "media_service"),
            ptz_url: service_url(device_url, "ptz_service"),
            username: username.to_string(),
            password: password.to_string(),
            clock_offset: TimeDelta::zero(),
            client,
        })
    }

    /// Align the WS-Security timestamp with the camera clock
    ///
    /// GetSystemDateAndTime is unauthenticated, so this works even when the
    /// clocks are too far apart for a digest to be accepted.
    pub async fn sync_clock(&mut self) -> Result<TimeDelta> {
        let request = envelope(&[("tds", NS_DEVICE)], "", "<tds:GetSystemDateAndTime/>");
        let response = self
            .post(&self.device_url, "GetSystemDateAndTime", request)
            .await?;
        let device_time = parse_system_time(&response)?;

        self.clock_offset = device_time - Utc::now();
        tracing::info!(
            device_time = %device_time,
            offset_sec = self.clock_offset.num_seconds(),
            "Camera clock offset applied"
        );
        Ok(self.clock_offset)
    }

    /// Resolve Media/PTZ service addresses via GetCapabilities
    ///
    /// Keeps the conventional paths for anything the device does not report.
    pub async fn discover_services(&mut self) -> Result<()> {
        let body = r#"<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>"#;
        let response = self
            .call(&self.device_url, "GetCapabilities", &[("tds", NS_DEVICE)], body)
            .await?;

        let (media, ptz) = parse_capabilities(&response);
        if let Some(media) = media {
            self.media_url = media;
        }
        if let Some(ptz) = ptz {
            self.ptz_url = ptz;
        }

        tracing::info!(
            media_url = %self.media_url,
            ptz_url = %self.ptz_url,
            "ONVIF services resolved"
        );
        Ok(())
    }

    /// WS-Security UsernameToken header
    fn security_header(&self) -> String {
        let nonce: [u8; 16] = rand::random();
        let nonce_base64 = base64::engine::general_purpose::STANDARD.encode(nonce);

        let created = self.created_at(Utc::now());

        // Password Digest = Base64(SHA1(nonce + created + password))
        let mut hasher = Sha1::new();
        hasher.update(nonce);
        hasher.update(created.as_bytes());
        hasher.update(self.password.as_bytes());
        let digest_base64 = base64::engine::general_purpose::STANDARD.encode(hasher.finalize());

        format!(
            r#"<s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd"
              s:mustUnderstand="true">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </s:Header>"#,
            xml_escape(&self.username),
            digest_base64,
            nonce_base64,
            created
        )
    }

    /// `Created` timestamp for a local instant, shifted onto the camera clock
    fn created_at(&self, now: DateTime<Utc>) -> String {
        (now + self.clock_offset)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    }

    /// Send one authenticated SOAP request and return the response body
    async fn call(
        &self,
        url: &str,
        action: &str,
        namespaces: &[(&str, &str)],
        body: &str,
    ) -> Result<String> {
        let request = envelope(namespaces, &self.security_header(), body);
        self.post(url, action, request).await
    }

    async fn post(&self, url: &str, action: &str, request: String) -> Result<String> {
        tracing::debug!(url = %url, action = %action, "Sending ONVIF request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("ONVIF {} request failed: {}", action, e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if let Some(reason) = fault_reason(&text) {
            tracing::error!(action = %action, status = %status, reason = %reason, "ONVIF fault");
            return Err(Error::Device(format!("ONVIF {} fault: {}", action, reason)));
        }
        if !status.is_success() {
            tracing::error!(action = %action, status = %status, body = %text, "ONVIF request failed");
            return Err(Error::Device(format!(
                "ONVIF {} failed with status {}",
                action, status
            )));
        }

        tracing::debug!(action = %action, "ONVIF request succeeded");
        Ok(text)
    }
}

#[async_trait]
impl PtzDevice for OnvifClient {
    async fn get_profiles(&self) -> Result<Vec<MediaProfile>> {
        let response = self
            .call(&self.media_url, "GetProfiles", &[("trt", NS_MEDIA)], "<trt:GetProfiles/>")
            .await?;
        parse_profiles(&response)
    }

    async fn continuous_move(&self, profile_token: &str, velocity: &Velocity) -> Result<()> {
        let body = continuous_move_body(profile_token, velocity);
        self.call(
            &self.ptz_url,
            "ContinuousMove",
            &[("tptz", NS_PTZ), ("tt", NS_SCHEMA)],
            &body,
        )
        .await?;
        Ok(())
    }

    async fn stop(&self, profile_token: &str) -> Result<()> {
        let body = format!(
            r#"<tptz:Stop>
      <tptz:ProfileToken>{}</tptz:ProfileToken>
      <tptz:PanTilt>true</tptz:PanTilt>
      <tptz:Zoom>true</tptz:Zoom>
    </tptz:Stop>"#,
            xml_escape(profile_token)
        );
        self.call(&self.ptz_url, "Stop", &[("tptz", NS_PTZ)], &body)
            .await?;
        Ok(())
    }

    async fn get_status(&self, profile_token: &str) -> Result<PtzStatus> {
        let body = format!(
            r#"<tptz:GetStatus><tptz:ProfileToken>{}</tptz:ProfileToken></tptz:GetStatus>"#,
            xml_escape(profile_token)
        );
        let response = self
            .call(&self.ptz_url, "GetStatus", &[("tptz", NS_PTZ)], &body)
            .await?;
        parse_status(&response)
    }
}

/// Opens `OnvifClient` sessions against one camera
#[derive(Debug, Clone)]
pub struct OnvifConnector {
    device_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl OnvifConnector {
    pub fn new(device_url: &str, username: &str, password: &str, timeout: Duration) -> Self {
        Self {
            device_url: device_url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl PtzConnector for OnvifConnector {
    async fn open(&self) -> Result<Arc<dyn PtzDevice>> {
        let mut client =
            OnvifClient::new(&self.device_url, &self.username, &self.password, self.timeout)?;

        if let Err(e) = client.sync_clock().await {
            tracing::warn!(error = %e, "Camera clock sync failed, using local time");
        }

        // Unreachable device fails here; a device without GetCapabilities keeps defaults
        match client.discover_services().await {
            Ok(()) => {}
            Err(e @ Error::Network(_)) => return Err(e),
            Err(e) => tracing::warn!(
                error = %e,
                "GetCapabilities failed, using default service paths"
            ),
        }

        Ok(Arc::new(client))
    }
}

/// Sibling service URL of the device service
fn service_url(device_url: &str, service: &str) -> String {
    if device_url.contains("/onvif/device_service") {
        device_url.replace("device_service", service)
    } else {
        let base = device_url.trim_end_matches('/');
        match base.find("://").map(|i| i + 3) {
            Some(host_start) => match base[host_start..].find('/') {
                Some(path_start) => format!("{}/onvif/{}", &base[..host_start + path_start], service),
                None => format!("{}/onvif/{}", base, service),
            },
            None => format!("{}/onvif/{}", base, service),
        }
    }
}

fn envelope(namespaces: &[(&str, &str)], header: &str, body: &str) -> String {
    let xmlns: String = namespaces
        .iter()
        .map(|(prefix, uri)| format!("\n            xmlns:{}=\"{}\"", prefix, uri))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope"{}>
  {}
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
        xmlns, header, body
    )
}

fn continuous_move_body(profile_token: &str, velocity: &Velocity) -> String {
    let mut components = String::new();
    if let Some(pan_tilt) = velocity.pan_tilt {
        components.push_str(&format!(
            r#"<tt:PanTilt x="{}" y="{}"/>"#,
            pan_tilt.x, pan_tilt.y
        ));
    }
    if let Some(zoom) = velocity.zoom {
        components.push_str(&format!(r#"<tt:Zoom x="{}"/>"#, zoom));
    }
    format!(
        r#"<tptz:ContinuousMove>
      <tptz:ProfileToken>{}</tptz:ProfileToken>
      <tptz:Velocity>{}</tptz:Velocity>
    </tptz:ContinuousMove>"#,
        xml_escape(profile_token),
        components
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn child_text(node: Node, name: &str) -> Option<String> {
    node.children()
        .find(|child| child.is_element() && child.has_tag_name(name))
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// First http address of a whitespace-separated XAddr list
fn select_xaddr(text: &str) -> Option<String> {
    let candidates: Vec<&str> = text.split_whitespace().collect();
    candidates
        .iter()
        .find(|addr| addr.starts_with("http://"))
        .or_else(|| candidates.first())
        .map(|addr| addr.to_string())
}

fn parse_capabilities(body: &str) -> (Option<String>, Option<String>) {
    let doc = match Document::parse(body) {
        Ok(doc) => doc,
        Err(_) => return (None, None),
    };
    let xaddr = |tag: &str| {
        doc.descendants()
            .find(|node| node.has_tag_name(tag))
            .and_then(|node| child_text(node, "XAddr"))
            .and_then(|text| select_xaddr(&text))
    };
    (xaddr("Media"), xaddr("PTZ"))
}

fn parse_profiles(body: &str) -> Result<Vec<MediaProfile>> {
    let doc = Document::parse(body)
        .map_err(|e| Error::Device(format!("invalid GetProfiles XML: {}", e)))?;

    let mut profiles = Vec::new();
    for profile in doc.descendants().filter(|node| node.has_tag_name("Profiles")) {
        let Some(token) = profile.attribute("token") else {
            tracing::warn!("GetProfiles profile token missing");
            continue;
        };
        let ptz_configuration = profile
            .children()
            .find(|node| node.has_tag_name("PTZConfiguration"))
            .map(|node| node.attribute("token").unwrap_or_default().to_string());

        profiles.push(MediaProfile {
            token: token.to_string(),
            name: child_text(profile, "Name"),
            ptz_configuration,
        });
    }
    Ok(profiles)
}

fn parse_status(body: &str) -> Result<PtzStatus> {
    let doc = Document::parse(body)
        .map_err(|e| Error::Device(format!("invalid GetStatus XML: {}", e)))?;

    let float_attr = |node: Node, name: &str| node.attribute(name).and_then(|v| v.trim().parse().ok());
    let mut status = PtzStatus::default();

    if let Some(position) = doc.descendants().find(|node| node.has_tag_name("Position")) {
        if let Some(pan_tilt) = position.children().find(|node| node.has_tag_name("PanTilt")) {
            status.pan = float_attr(pan_tilt, "x");
            status.tilt = float_attr(pan_tilt, "y");
        }
        if let Some(zoom) = position.children().find(|node| node.has_tag_name("Zoom")) {
            status.zoom = float_attr(zoom, "x");
        }
    }
    if let Some(move_status) = doc.descendants().find(|node| node.has_tag_name("MoveStatus")) {
        status.move_status = child_text(move_status, "PanTilt").or_else(|| child_text(move_status, "Zoom"));
    }

    Ok(status)
}

/// Camera UTC time from a GetSystemDateAndTime response
fn parse_system_time(body: &str) -> Result<DateTime<Utc>> {
    let doc = Document::parse(body)
        .map_err(|e| Error::Device(format!("invalid GetSystemDateAndTime XML: {}", e)))?;
    let invalid = || Error::Device("GetSystemDateAndTime response has no valid UTCDateTime".to_string());

    let utc = doc
        .descendants()
        .find(|node| node.has_tag_name("UTCDateTime"))
        .ok_or_else(invalid)?;
    let field = |parent: &str, name: &str| -> Option<u32> {
        let parent = utc.children().find(|node| node.has_tag_name(parent))?;
        child_text(parent, name)?.parse().ok()
    };

    let year = field("Date", "Year").ok_or_else(invalid)?;
    NaiveDate::from_ymd_opt(
        year as i32,
        field("Date", "Month").ok_or_else(invalid)?,
        field("Date", "Day").ok_or_else(invalid)?,
    )
    .and_then(|date| {
        date.and_hms_opt(
            field("Time", "Hour")?,
            field("Time", "Minute")?,
            field("Time", "Second")?,
        )
    })
    .map(|naive| naive.and_utc())
    .ok_or_else(invalid)
}

/// Reason text of a SOAP fault, if the body is one
fn fault_reason(body: &str) -> Option<String> {
    let doc = Document::parse(body).ok()?;
    let fault = doc.descendants().find(|node| node.has_tag_name("Fault"))?;
    let reason = fault
        .descendants()
        .find(|node| node.has_tag_name("Text") || node.has_tag_name("faultstring"))
        .and_then(|node| node.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());
    Some(reason.unwrap_or_else(|| "unknown fault".to_string()))
}
