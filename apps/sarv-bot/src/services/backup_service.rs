use chrono::{DateTime, NaiveDate};

use crate::marzban::types::{bytes_to_gb, resolve_subscription_link, MarzbanAccount};

pub const CSV_HEADER: &str = "panel,username,expire,data_limit_gb,used_traffic_gb,subscription_link\n";

/// One CSV line per panel account, mirroring what admins need to rebuild a
/// panel: who, until when, how much, and the link.
pub fn csv_row(panel_name: &str, base_url: &str, account: &MarzbanAccount) -> String {
    let expire = match account.expire_ts() {
        Some(ts) => DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        None => "N/A".to_string(),
    };
    let limit = if account.data_limit_bytes() == 0 {
        "Unlimited".to_string()
    } else {
        bytes_to_gb(account.data_limit_bytes()).to_string()
    };
    format!(
        "{},{},{},{},{},{}\n",
        csv_field(panel_name),
        csv_field(&account.username),
        expire,
        limit,
        bytes_to_gb(account.used_traffic),
        csv_field(&resolve_subscription_link(base_url, account)),
    )
}

pub fn backup_file_name(date: NaiveDate) -> String {
    format!("panel_backup_{}.csv", date.format("%Y-%m-%d"))
}

fn csv_field(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: i64 = 1 << 30;

    fn account(expire: Option<i64>, data_limit: Option<i64>, used: i64) -> MarzbanAccount {
        MarzbanAccount {
            username: "user_1_abc123".into(),
            status: "active".into(),
            expire,
            data_limit,
            used_traffic: used,
            subscription_url: Some("/sub/abc".into()),
            links: vec![],
        }
    }

    #[test]
    fn row_carries_panel_account_and_link() {
        let acc = account(Some(1_700_000_000), Some(10 * GB), 2 * GB);
        let row = csv_row("main", "https://p.example", &acc);
        assert_eq!(
            row,
            "main,user_1_abc123,2023-11-14,10,2,https://p.example/sub/abc\n"
        );
    }

    #[test]
    fn unlimited_account_renders_placeholders() {
        let acc = account(None, None, 0);
        let row = csv_row("main", "https://p.example", &acc);
        assert!(row.contains(",N/A,Unlimited,"));
    }

    #[test]
    fn fields_with_commas_are_quoted() {
        let acc = account(None, Some(GB), 0);
        let row = csv_row("main, eu", "https://p.example", &acc);
        assert!(row.starts_with("\"main, eu\","));
    }

    #[test]
    fn file_name_carries_the_date() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        assert_eq!(backup_file_name(date), "panel_backup_2026-08-29.csv");
    }
}
