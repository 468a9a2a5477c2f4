//! Bridge discovery.
//!
//! Bridges are looked for with an SSDP multicast search first. When nothing
//! answers, the cloud discovery endpoint is asked for bridges registered
//! from this network, and as a last resort a /24 subnet is scanned. Every
//! address, whichever stage found it, is verified with a probe of the public
//! config endpoint. Discovery never fails: each stage logs and swallows its
//! errors, and "nothing found" is an empty list.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::client;
use crate::config::BridgeConfig;
use crate::errors::Error;
use crate::runtime::{self, AsyncUdpSocket, Instant, UdpSocket};

type Result<T> = std::result::Result<T, Error>;

const SSDP_ADDR: &str = "239.255.255.250:1900";
const SSDP_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const M_SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
    HOST: 239.255.255.250:1900\r\n\
    MAN: \"ssdp:discover\"\r\n\
    MX: 3\r\n\
    ST: upnp:rootdevice\r\n\
    \r\n";

/// Substrings that mark an SSDP reply or device descriptor as a bridge.
const BRIDGE_TOKENS: [&str; 5] = ["IpBridge", "Philips", "hue-bridgeid", "BSB002", "BSB001"];

const DEFAULT_BRIDGE_NAME: &str = "Philips Hue";

/// A bridge found on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeCandidate {
    /// Host or host:port the bridge answers HTTP on.
    pub address: String,
    /// Bridge id, or the address when the bridge did not reveal it.
    pub id: String,
    pub name: String,
}

impl BridgeCandidate {
    fn new(address: &str, id: Option<&str>, name: Option<&str>) -> Self {
        BridgeCandidate {
            address: address.to_string(),
            id: id.unwrap_or(address).to_string(),
            name: name.unwrap_or(DEFAULT_BRIDGE_NAME).to_string(),
        }
    }
}

/// Windows and fallbacks of a discovery run.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// How long to collect SSDP replies.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "multicast_window_ms")]
    pub multicast_window: Duration,
    /// Timeout for fetching the descriptor an SSDP reply points to.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "description_timeout_ms")]
    pub description_timeout: Duration,
    /// Timeout of one config probe, and of the cloud request.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "probe_timeout_ms")]
    pub probe_timeout: Duration,
    /// Cloud discovery endpoint; `None` disables the cloud fallback.
    pub cloud_endpoint: Option<String>,
    /// Any address of the /24 to scan; `None` disables the scan.
    pub scan_subnet: Option<Ipv4Addr>,
    /// Timeout of one probe during the subnet scan.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "scan_probe_timeout_ms")]
    pub scan_probe_timeout: Duration,
    /// Overall limit of the subnet scan.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "scan_deadline_ms")]
    pub scan_deadline: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            multicast_window: Duration::from_secs(5),
            description_timeout: Duration::from_secs(2),
            probe_timeout: Duration::from_secs(3),
            cloud_endpoint: Some("https://discovery.meethue.com/".to_string()),
            scan_subnet: None,
            scan_probe_timeout: Duration::from_millis(500),
            scan_deadline: Duration::from_secs(10),
        }
    }
}

/// Find bridges on the local network.
///
/// # Examples
///
/// ```no_run
/// use hue_timeline_rs::{DiscoveryOptions, discover_bridges};
///
/// # async fn run() {
/// let bridges = discover_bridges(&DiscoveryOptions::default()).await;
/// for bridge in bridges {
///     println!("{} at {}", bridge.name, bridge.address);
/// }
/// # }
/// ```
pub async fn discover_bridges(options: &DiscoveryOptions) -> Vec<BridgeCandidate> {
    let http = match reqwest::Client::builder().build() {
        Ok(http) => http,
        Err(e) => {
            warn!("Discovery disabled, cannot build http client: {e}");
            return Vec::new();
        }
    };
    let mut checked = HashSet::new();

    match ssdp_search(&http, SSDP_ADDR, options, &mut checked).await {
        Ok(found) if !found.is_empty() => return found,
        Ok(_) => debug!("No bridge answered the SSDP search"),
        Err(e) => warn!("SSDP search failed: {e}"),
    }

    if let Some(endpoint) = &options.cloud_endpoint {
        match cloud_lookup(&http, endpoint, options.probe_timeout, &mut checked).await {
            Ok(found) if !found.is_empty() => return found,
            Ok(_) => debug!("Cloud discovery returned no reachable bridge"),
            Err(e) => warn!("Cloud discovery failed: {e}"),
        }
    }

    if let Some(subnet) = options.scan_subnet {
        let found = scan_subnet(&http, subnet, options, &checked).await;
        if !found.is_empty() {
            return found;
        }
        debug!("Subnet scan of {subnet}/24 found no bridge");
    }

    Vec::new()
}

/// Check whether `address` hosts a bridge by reading its public config.
///
/// A 200 answer carrying a name, model id or software version confirms, as
/// does a 401. Everything else, including a timeout, rejects. A bridge that
/// does not report a name is named after its model when the model is known.
pub async fn probe_bridge(
    http: &reqwest::Client,
    address: &str,
    timeout: Duration,
) -> Option<BridgeCandidate> {
    let url = client::base_url(address).ok()?.join("api/config").ok()?;
    let resp = match http.get(url).timeout(timeout).send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!("Probe of {address} failed: {e}");
            return None;
        }
    };

    match resp.status() {
        StatusCode::UNAUTHORIZED => Some(BridgeCandidate::new(address, None, None)),
        StatusCode::OK => {
            let config = resp.json::<BridgeConfig>().await.ok()?;
            if !config.identifies_bridge() {
                debug!("{address} answered but does not look like a bridge");
                return None;
            }
            let name = match (&config.name, &config.modelid) {
                (Some(name), _) => Some(name.clone()),
                (None, Some(model)) if config.is_known_model() => {
                    Some(format!("{DEFAULT_BRIDGE_NAME} {model}"))
                }
                (None, model) => {
                    debug!("{address} reports unknown model {model:?}");
                    None
                }
            };
            Some(BridgeCandidate::new(
                address,
                config.bridgeid.as_deref(),
                name.as_deref(),
            ))
        }
        status => {
            debug!("Probe of {address} returned {status}");
            None
        }
    }
}

/// Whether an SSDP reply or descriptor names a bridge product.
pub fn contains_bridge_token(text: &str) -> bool {
    BRIDGE_TOKENS.iter().any(|token| text.contains(token))
        || text.to_ascii_lowercase().contains("hue")
}

/// Value of the `Location` header of an SSDP reply, if any.
pub fn location_header(reply: &str) -> Option<&str> {
    header(reply, "location")
}

fn header<'a>(reply: &'a str, name: &str) -> Option<&'a str> {
    reply.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case(name) && !value.is_empty()).then_some(value)
    })
}

async fn ssdp_search(
    http: &reqwest::Client,
    target: &str,
    options: &DiscoveryOptions,
    checked: &mut HashSet<String>,
) -> Result<Vec<BridgeCandidate>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|e| Error::socket("bind", e))?;
    socket
        .set_multicast_ttl_v4(2)
        .map_err(|e| Error::socket("set_multicast_ttl", e))?;
    if let Err(e) = socket.join_multicast_v4(SSDP_GROUP, Ipv4Addr::UNSPECIFIED) {
        debug!("Could not join SSDP group: {e}");
    }

    socket
        .send_to(M_SEARCH.as_bytes(), target)
        .await
        .map_err(|e| Error::socket("send_to", e))?;

    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let start = Instant::now();
    let mut buffer = [0u8; 2048];
    let recv_timeout = Duration::from_millis(500);

    while start.elapsed() < options.multicast_window {
        let wait = recv_timeout.min(options.multicast_window.saturating_sub(start.elapsed()));
        let (size, addr) = match runtime::timeout(wait, socket.recv_from(&mut buffer)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) | Err(_) => continue,
        };
        let ip = match addr {
            SocketAddr::V4(v4) => v4.ip().to_string(),
            SocketAddr::V6(_) => continue,
        };
        // Bridges answer once per advertised service.
        if !seen.insert(ip.clone()) {
            continue;
        }

        let reply = String::from_utf8_lossy(&buffer[..size]).into_owned();
        if let Some(candidate) = confirm_reply(http, &ip, &reply, options, checked).await {
            info!("Found bridge at {ip} via SSDP");
            found.push(candidate);
        }
    }

    Ok(found)
}

/// Turn one SSDP reply from `ip` into a confirmed bridge.
///
/// Replies that do not look like a bridge are dropped without touching
/// `checked`, so the fallbacks may still try the address. Replies that do
/// are confirmed with a config probe, and the address then counts as
/// checked whatever the outcome.
async fn confirm_reply(
    http: &reqwest::Client,
    ip: &str,
    reply: &str,
    options: &DiscoveryOptions,
    checked: &mut HashSet<String>,
) -> Option<BridgeCandidate> {
    if !is_bridge_reply(http, reply, options.description_timeout).await {
        return None;
    }
    checked.insert(ip.to_string());

    let mut candidate = probe_bridge(http, ip, options.probe_timeout).await?;
    if candidate.id == ip
        && let Some(id) = header(reply, "hue-bridgeid")
    {
        candidate.id = id.to_string();
    }
    Some(candidate)
}

async fn is_bridge_reply(http: &reqwest::Client, reply: &str, timeout: Duration) -> bool {
    if contains_bridge_token(reply) {
        return true;
    }
    let Some(location) = location_header(reply) else {
        return false;
    };
    match fetch_descriptor(http, location, timeout).await {
        Ok(descriptor) => contains_bridge_token(&descriptor),
        Err(e) => {
            debug!("Could not fetch descriptor {location}: {e}");
            false
        }
    }
}

async fn fetch_descriptor(http: &reqwest::Client, location: &str, timeout: Duration) -> Result<String> {
    let resp = http
        .get(location)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::http("GET descriptor", e))?;
    if resp.status() != StatusCode::OK {
        return Err(Error::status("GET descriptor", resp.status()));
    }
    resp.text().await.map_err(|e| Error::http("GET descriptor", e))
}

#[derive(Debug, Deserialize)]
struct CloudEntry {
    #[serde(default)]
    id: String,
    internalipaddress: String,
}

async fn cloud_lookup(
    http: &reqwest::Client,
    endpoint: &str,
    timeout: Duration,
    checked: &mut HashSet<String>,
) -> Result<Vec<BridgeCandidate>> {
    let resp = http
        .get(endpoint)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::http("GET cloud discovery", e))?;
    if resp.status() != StatusCode::OK {
        return Err(Error::status("GET cloud discovery", resp.status()));
    }
    let entries: Vec<CloudEntry> = resp
        .json()
        .await
        .map_err(|e| Error::http("GET cloud discovery", e))?;
    debug!("Cloud discovery listed {} bridge(s)", entries.len());

    let entries: Vec<CloudEntry> = entries
        .into_iter()
        .filter(|e| checked.insert(e.internalipaddress.clone()))
        .collect();
    let probes = entries.iter().map(|entry| async move {
        let mut candidate = probe_bridge(http, &entry.internalipaddress, timeout).await?;
        if candidate.id == entry.internalipaddress && !entry.id.is_empty() {
            candidate.id = entry.id.clone();
        }
        Some(candidate)
    });

    Ok(join_all(probes).await.into_iter().flatten().collect())
}

/// Probe every host of the /24 around `subnet`, returning whatever was
/// confirmed before the scan deadline.
async fn scan_subnet(
    http: &reqwest::Client,
    subnet: Ipv4Addr,
    options: &DiscoveryOptions,
    checked: &HashSet<String>,
) -> Vec<BridgeCandidate> {
    let [a, b, c, _] = subnet.octets();
    info!("Scanning {a}.{b}.{c}.0/24 for bridges");

    let mut probes: FuturesUnordered<_> = (1..=254u8)
        .map(|host| Ipv4Addr::new(a, b, c, host).to_string())
        .filter(|address| !checked.contains(address))
        .map(|address| async move { probe_bridge(http, &address, options.scan_probe_timeout).await })
        .collect();

    let mut found = Vec::new();
    let collect = async {
        while let Some(result) = probes.next().await {
            found.extend(result);
        }
    };
    if runtime::timeout(options.scan_deadline, collect).await.is_err() {
        debug!("Subnet scan hit its deadline with {} result(s)", found.len());
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HUE_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        CACHE-CONTROL: max-age=100\r\n\
        LOCATION: http://192.168.1.2:80/description.xml\r\n\
        SERVER: Linux/3.14.0 UPnP/1.0 IpBridge/1.48.0\r\n\
        hue-bridgeid: 001788FFFE000000\r\n\
        ST: upnp:rootdevice\r\n\r\n";

    const ROUTER_REPLY: &str = "HTTP/1.1 200 OK\r\n\
        location: http://192.168.1.1:5000/rootDesc.xml\r\n\
        SERVER: OpenWRT/18.06 UPnP/1.1 MiniUPnPd/2.1\r\n\
        ST: upnp:rootdevice\r\n\r\n";

    #[test]
    fn test_bridge_tokens() {
        assert!(contains_bridge_token(HUE_REPLY));
        assert!(!contains_bridge_token(ROUTER_REPLY));
        assert!(contains_bridge_token("<modelName>Philips hue bridge 2015</modelName>"));
        assert!(contains_bridge_token("<modelNumber>BSB002</modelNumber>"));
        assert!(contains_bridge_token("friendlyName: HUE"));
    }

    #[test]
    fn test_location_header_any_case() {
        assert_eq!(
            location_header(HUE_REPLY),
            Some("http://192.168.1.2:80/description.xml")
        );
        assert_eq!(
            location_header(ROUTER_REPLY),
            Some("http://192.168.1.1:5000/rootDesc.xml")
        );
        assert_eq!(location_header("HTTP/1.1 200 OK\r\nST: x\r\n"), None);
        assert_eq!(location_header("LOCATION:   \r\n"), None);
    }

    #[test]
    fn test_bridge_id_header() {
        assert_eq!(header(HUE_REPLY, "hue-bridgeid"), Some("001788FFFE000000"));
    }

    #[test]
    fn test_options_accept_partial_settings() {
        let options: DiscoveryOptions =
            serde_json::from_str(r#"{"multicast_window_ms": 1500, "scan_subnet": "10.0.0.7"}"#)
                .unwrap();
        assert_eq!(options.multicast_window, Duration::from_millis(1500));
        assert_eq!(options.scan_subnet, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(options.probe_timeout, Duration::from_secs(3));
        assert!(options.cloud_endpoint.is_some());
    }

    fn fast_options() -> DiscoveryOptions {
        DiscoveryOptions {
            multicast_window: Duration::from_millis(300),
            description_timeout: Duration::from_millis(300),
            probe_timeout: Duration::from_millis(300),
            ..DiscoveryOptions::default()
        }
    }

    #[tokio::test]
    async fn test_token_reply_is_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let ip = server.address().to_string();
        let mut checked = HashSet::new();
        let candidate = confirm_reply(&reqwest::Client::new(), &ip, HUE_REPLY, &fast_options(), &mut checked)
            .await
            .expect("bridge is confirmed");
        assert_eq!(candidate.address, ip);
        assert_eq!(candidate.id, "001788FFFE000000");
        assert_eq!(candidate.name, DEFAULT_BRIDGE_NAME);
        assert!(checked.contains(&ip));
    }

    #[tokio::test]
    async fn test_token_reply_needs_config() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let ip = server.address().to_string();
        let mut checked = HashSet::new();
        assert!(
            confirm_reply(&reqwest::Client::new(), &ip, HUE_REPLY, &fast_options(), &mut checked)
                .await
                .is_none()
        );
        assert!(checked.contains(&ip));
    }

    #[tokio::test]
    async fn test_descriptor_reply_is_confirmed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/description.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<root><modelName>Philips hue bridge 2015</modelName></root>"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Hallway",
                "bridgeid": "001788FFFE654321",
                "modelid": "BSB002"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = format!(
            "HTTP/1.1 200 OK\r\nLOCATION: {}/description.xml\r\nSERVER: Linux UPnP/1.0\r\n\r\n",
            server.uri()
        );
        assert!(!contains_bridge_token(&reply));

        let ip = server.address().to_string();
        let mut checked = HashSet::new();
        let candidate = confirm_reply(&reqwest::Client::new(), &ip, &reply, &fast_options(), &mut checked)
            .await
            .expect("bridge is confirmed");
        assert_eq!(candidate.id, "001788FFFE654321");
        assert_eq!(candidate.name, "Hallway");
    }

    #[tokio::test]
    async fn test_unmatched_reply_leaves_address_to_cloud() {
        let server = MockServer::start().await;
        let ip = server.address().to_string();
        Mock::given(method("GET"))
            .and(path("/cloud"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "ecb5fafffe000001", "internalipaddress": &ip}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Slow descriptor",
                "modelid": "BSB002"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let options = fast_options();
        let reply = "HTTP/1.1 200 OK\r\nLOCATION: http://127.0.0.1:1/description.xml\r\n\r\n";
        let mut checked = HashSet::new();
        assert!(confirm_reply(&http, &ip, reply, &options, &mut checked).await.is_none());
        assert!(checked.is_empty());

        let endpoint = format!("{}/cloud", server.uri());
        let found = cloud_lookup(&http, &endpoint, options.probe_timeout, &mut checked)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, ip);
        assert_eq!(found[0].id, "ecb5fafffe000001");
    }

    #[tokio::test]
    async fn test_search_drops_unconfirmed_reply() {
        let responder = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            let (size, from) = responder.recv_from(&mut buffer).await.unwrap();
            assert!(String::from_utf8_lossy(&buffer[..size]).starts_with("M-SEARCH"));
            for _ in 0..2 {
                responder.send_to(HUE_REPLY.as_bytes(), from).await.unwrap();
            }
        });

        let mut checked = HashSet::new();
        let found = ssdp_search(&reqwest::Client::new(), &target, &fast_options(), &mut checked)
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(checked.contains("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_probe_rejects_unreachable_host() {
        let http = reqwest::Client::new();
        assert!(
            probe_bridge(&http, "127.0.0.1:1", Duration::from_millis(200))
                .await
                .is_none()
        );
    }
}
