use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Document;

static NICKNAME: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Za-z][A-Za-z0-9_]{0,25}$").unwrap());

/// Check a proposed nickname: a leading letter, then up to 25 letters,
/// digits or underscores.
pub fn is_valid_nickname(name: &str) -> bool {
    NICKNAME.is_match(name)
}

/// A single piece of mail. `sender` is `None` for system mail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailEntry {
    pub sender: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
    pub message: String,
}

/// Mute status. `until` of `None` means indefinite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteData {
    pub reason: String,
    pub muted_by: Option<Uuid>,
    pub until: Option<DateTime<Utc>>,
}

impl MuteData {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.until.is_some_and(|until| until <= now)
    }
}

/// Jail status. The jail itself is identified by name; where it is in the
/// world is the host's business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JailData {
    pub jail: String,
    pub reason: Option<String>,
    pub until: Option<DateTime<Utc>>,
}

impl JailData {
    pub fn expired(&self, now: DateTime<Utc>) -> bool {
        self.until.is_some_and(|until| until <= now)
    }
}

/// The typed per-player record.
///
/// Unknown keys land in `extra` and survive a save/load round-trip, so a
/// newer module's data is never dropped by an older build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    pub nickname: Option<String>,
    pub staff_chat: bool,
    pub mail: Vec<MailEntry>,
    pub mute: Option<MuteData>,
    pub jail: Option<JailData>,
    pub first_join: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_known_name: Option<String>,
    pub last_address: Option<String>,
    #[serde(flatten)]
    pub extra: Document,
}

impl UserData {
    /// Stamp a login. `first_join` is only ever set once.
    pub fn record_login(&mut self, name: &str, address: Option<String>, now: DateTime<Utc>) {
        self.first_join.get_or_insert(now);
        self.last_login = Some(now);
        self.last_known_name = Some(name.to_owned());
        if address.is_some() {
            self.last_address = address;
        }
    }

    pub fn record_logout(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
    }

    pub fn add_mail(&mut self, entry: MailEntry) {
        self.mail.push(entry);
    }

    /// Remove all mail, returning how many entries were cleared.
    pub fn clear_mail(&mut self) -> usize {
        let count = self.mail.len();
        self.mail.clear();
        count
    }

    /// The mute currently in force. An expired mute is dropped here rather
    /// than lingering on disk.
    pub fn active_mute(&mut self, now: DateTime<Utc>) -> Option<&MuteData> {
        if self.mute.as_ref().is_some_and(|mute| mute.expired(now)) {
            self.mute = None;
        }
        self.mute.as_ref()
    }

    /// The jail term currently in force, dropping an expired one.
    pub fn active_jail(&mut self, now: DateTime<Utc>) -> Option<&JailData> {
        if self.jail.as_ref().is_some_and(|jail| jail.expired(now)) {
            self.jail = None;
        }
        self.jail.as_ref()
    }
}
