use teloxide::prelude::*;
use teloxide::types::InputFile;

/// Outbound broadcast payload as an explicit tagged union; the send path
/// matches on it instead of picking a method by media-type string.
#[derive(Debug, Clone)]
pub enum OutboundMedia {
    Text(String),
    Photo { file_id: String, caption: String },
    Video { file_id: String, caption: String },
    Document { file_id: String, caption: String },
}

impl OutboundMedia {
    pub fn from_message(msg: &Message) -> Option<Self> {
        let caption = msg.caption().unwrap_or_default().to_string();
        if let Some(text) = msg.text() {
            return Some(OutboundMedia::Text(text.to_string()));
        }
        if let Some(photos) = msg.photo() {
            let largest = photos.last()?;
            return Some(OutboundMedia::Photo {
                file_id: largest.file.id.to_string(),
                caption,
            });
        }
        if let Some(video) = msg.video() {
            return Some(OutboundMedia::Video {
                file_id: video.file.id.to_string(),
                caption,
            });
        }
        if let Some(doc) = msg.document() {
            return Some(OutboundMedia::Document {
                file_id: doc.file.id.to_string(),
                caption,
            });
        }
        None
    }

    pub async fn send_to(&self, bot: &Bot, chat: ChatId) -> Result<(), teloxide::RequestError> {
        match self {
            OutboundMedia::Text(text) => {
                bot.send_message(chat, text.clone()).await?;
            }
            OutboundMedia::Photo { file_id, caption } => {
                bot.send_photo(chat, InputFile::file_id(file_id.clone().into()))
                    .caption(caption.clone())
                    .await?;
            }
            OutboundMedia::Video { file_id, caption } => {
                bot.send_video(chat, InputFile::file_id(file_id.clone().into()))
                    .caption(caption.clone())
                    .await?;
            }
            OutboundMedia::Document { file_id, caption } => {
                bot.send_document(chat, InputFile::file_id(file_id.clone().into()))
                    .caption(caption.clone())
                    .await?;
            }
        }
        Ok(())
    }
}

/// 1234567 -> "1,234,567"
pub fn format_price(amount: i64) -> String {
    let digits = amount.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn format_expire(ts: Option<i64>) -> String {
    match ts {
        None => "unlimited".to_string(),
        Some(ts) => chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_grouping() {
        assert_eq!(format_price(0), "0");
        assert_eq!(format_price(999), "999");
        assert_eq!(format_price(1000), "1,000");
        assert_eq!(format_price(80000), "80,000");
        assert_eq!(format_price(1234567), "1,234,567");
    }

    #[test]
    fn expire_formatting() {
        assert_eq!(format_expire(None), "unlimited");
        assert!(format_expire(Some(1_700_000_000)).starts_with("2023-11-14"));
    }
}
