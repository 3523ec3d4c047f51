use std::collections::HashMap;

use sarv_db::models::panel::PanelInbound;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const GIB: f64 = (1u64 << 30) as f64;

/// Account snapshot as Marzban returns it. Unlimited quantities come back
/// as 0 or null depending on the panel version, so both are tolerated.
#[derive(Debug, Clone, Deserialize)]
pub struct MarzbanAccount {
    pub username: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub expire: Option<i64>,
    #[serde(default)]
    pub data_limit: Option<i64>,
    #[serde(default)]
    pub used_traffic: i64,
    #[serde(default)]
    pub subscription_url: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
}

impl MarzbanAccount {
    /// None = never expires.
    pub fn expire_ts(&self) -> Option<i64> {
        self.expire.filter(|e| *e > 0)
    }

    /// 0 = unlimited.
    pub fn data_limit_bytes(&self) -> i64 {
        self.data_limit.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountList {
    #[serde(default)]
    pub users: Vec<MarzbanAccount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAccount {
    pub status: String,
    pub username: String,
    pub note: String,
    pub proxies: HashMap<String, serde_json::Value>,
    pub data_limit: i64,
    pub expire: i64,
    pub data_limit_reset_strategy: String,
    pub inbounds: HashMap<String, Vec<String>>,
}

impl NewAccount {
    pub fn new(
        username: String,
        data_limit: i64,
        expire: i64,
        inbounds: HashMap<String, Vec<String>>,
    ) -> Self {
        let proxies = proxies_for(&inbounds);
        Self {
            status: "active".into(),
            username,
            note: String::new(),
            proxies,
            data_limit,
            expire,
            data_limit_reset_strategy: "no_reset".into(),
            inbounds,
        }
    }
}

/// Partial update body for PUT /api/user/{username}.
#[derive(Debug, Clone, Serialize)]
pub struct AccountPatch {
    pub expire: i64,
    pub data_limit: i64,
}

/// 0 (unlimited) for non-positive traffic, otherwise bytes rounded from GiB.
pub fn data_limit_bytes(traffic_gb: f64) -> i64 {
    if traffic_gb <= 0.0 {
        return 0;
    }
    (traffic_gb * GIB).round() as i64
}

/// 0 (never) for non-positive durations, otherwise an absolute unix ts.
pub fn expire_timestamp(duration_days: i32, now: i64) -> i64 {
    if duration_days <= 0 {
        return 0;
    }
    now + duration_days as i64 * 86400
}

/// Renewal is anchored at max(current, now): early renewals keep their
/// remaining days, late renewals count from now instead of the stale expiry.
pub fn renewed_expire(current: Option<i64>, now: i64, duration_days: i32) -> i64 {
    let base = current.filter(|e| *e > 0).unwrap_or(now).max(now);
    base + duration_days as i64 * 86400
}

/// Random suffix instead of a counter so uniqueness needs no coordination
/// across processes.
pub fn generate_username(user_id: i64) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("user_{}_{}", user_id, &suffix[..6])
}

pub fn group_inbounds(rows: &[PanelInbound]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        map.entry(row.protocol.clone()).or_default().push(row.tag.clone());
    }
    map
}

fn proxies_for(inbounds: &HashMap<String, Vec<String>>) -> HashMap<String, serde_json::Value> {
    inbounds
        .keys()
        .map(|protocol| {
            let settings = if protocol.eq_ignore_ascii_case("vless") {
                serde_json::json!({ "flow": "xtls-rprx-vision" })
            } else {
                serde_json::json!({})
            };
            (protocol.clone(), settings)
        })
        .collect()
}

/// Prefer the panel's subscription URL (absolute or relative to the panel),
/// falling back to the raw per-inbound links.
pub fn resolve_subscription_link(base_url: &str, account: &MarzbanAccount) -> String {
    match &account.subscription_url {
        Some(path) if path.starts_with("http") => path.clone(),
        Some(path) => format!("{}{}", base_url.trim_end_matches('/'), path),
        None => account.links.join("\n"),
    }
}

pub fn bytes_to_gb(bytes: i64) -> f64 {
    if bytes <= 0 {
        return 0.0;
    }
    (bytes as f64 / GIB * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_traffic_means_unlimited() {
        assert_eq!(data_limit_bytes(0.0), 0);
        assert_eq!(data_limit_bytes(-1.0), 0);
    }

    #[test]
    fn traffic_converts_to_rounded_gib() {
        assert_eq!(data_limit_bytes(10.0), 10 * (1 << 30) as i64);
        assert_eq!(data_limit_bytes(0.2), (0.2 * GIB).round() as i64);
    }

    #[test]
    fn zero_duration_never_expires() {
        assert_eq!(expire_timestamp(0, 1_700_000_000), 0);
        assert_eq!(expire_timestamp(30, 1_700_000_000), 1_700_000_000 + 30 * 86400);
    }

    #[test]
    fn renewal_extends_from_future_expiry() {
        let now = 1_700_000_000;
        let future = now + 5 * 86400;
        assert_eq!(renewed_expire(Some(future), now, 30), future + 30 * 86400);
    }

    #[test]
    fn renewal_of_expired_account_counts_from_now() {
        let now = 1_700_000_000;
        let past = now - 5 * 86400;
        assert_eq!(renewed_expire(Some(past), now, 30), now + 30 * 86400);
    }

    #[test]
    fn renewal_without_expiry_counts_from_now() {
        let now = 1_700_000_000;
        assert_eq!(renewed_expire(None, now, 30), now + 30 * 86400);
        assert_eq!(renewed_expire(Some(0), now, 30), now + 30 * 86400);
    }

    #[test]
    fn username_carries_user_id_and_suffix() {
        let name = generate_username(42);
        assert!(name.starts_with("user_42_"));
        let suffix = name.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 6);
        // two calls must not collide
        assert_ne!(name, generate_username(42));
    }

    #[test]
    fn vless_proxies_get_vision_flow() {
        let mut inbounds = HashMap::new();
        inbounds.insert("vless".to_string(), vec!["VLESS TCP".to_string()]);
        inbounds.insert("vmess".to_string(), vec!["VMESS WS".to_string()]);
        let acc = NewAccount::new("u".into(), 0, 0, inbounds);
        assert_eq!(acc.proxies["vless"]["flow"], "xtls-rprx-vision");
        assert_eq!(acc.proxies["vmess"], serde_json::json!({}));
        assert_eq!(acc.data_limit_reset_strategy, "no_reset");
    }

    #[test]
    fn subscription_link_resolution() {
        let mut acc = MarzbanAccount {
            username: "u".into(),
            status: "active".into(),
            expire: None,
            data_limit: None,
            used_traffic: 0,
            subscription_url: Some("/sub/abc".into()),
            links: vec![],
        };
        assert_eq!(
            resolve_subscription_link("https://p.example/", &acc),
            "https://p.example/sub/abc"
        );
        acc.subscription_url = Some("https://cdn.example/sub/abc".into());
        assert_eq!(
            resolve_subscription_link("https://p.example", &acc),
            "https://cdn.example/sub/abc"
        );
        acc.subscription_url = None;
        acc.links = vec!["vless://one".into(), "vmess://two".into()];
        assert_eq!(
            resolve_subscription_link("https://p.example", &acc),
            "vless://one\nvmess://two"
        );
    }
}
