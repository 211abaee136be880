use serde::Deserialize;
use serde::Serialize;

use crate::ConcernType;
use crate::Result;

/// Per (group, subject) notification settings.
///
/// The engine treats this as an opaque blob; only the notification layer
/// interprets the fields. Every field defaults so older records still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConcernConfig {
    pub at: GroupConcernAtConfig,
    pub notify: GroupConcernNotifyConfig,
    pub filter: GroupConcernFilterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConcernAtConfig {
    /// Categories that trigger a broadcast mention
    pub at_all: ConcernType,
    pub at_someone: Vec<AtSomeone>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtSomeone {
    pub ctype: ConcernType,
    pub at_list: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConcernNotifyConfig {
    pub title_change_notify: ConcernType,
    pub offline_notify: ConcernType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConcernFilterConfig {
    /// Filter kind understood by the notification layer, empty for none
    pub kind: String,
    pub config: String,
}

impl GroupConcernConfig {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(value: &str) -> Result<Self> {
        Ok(serde_json::from_str(value)?)
    }

    pub fn should_at_all(
        &self,
        ctype: ConcernType,
    ) -> bool {
        self.at.at_all.contains_all(ctype)
    }

    /// Members to mention for `ctype`, merged over every matching entry.
    pub fn at_list(
        &self,
        ctype: ConcernType,
    ) -> Vec<i64> {
        let mut result: Vec<i64> = Vec::new();
        for entry in self.at.at_someone.iter().filter(|e| e.ctype.contains_all(ctype)) {
            for member in &entry.at_list {
                if !result.contains(member) {
                    result.push(*member);
                }
            }
        }
        result
    }

    pub fn set_at_someone(
        &mut self,
        ctype: ConcernType,
        at_list: Vec<i64>,
    ) {
        match self.at.at_someone.iter_mut().find(|e| e.ctype == ctype) {
            Some(entry) => entry.at_list = at_list,
            None => self.at.at_someone.push(AtSomeone { ctype, at_list }),
        }
    }

    pub fn notify_title_change(
        &self,
        ctype: ConcernType,
    ) -> bool {
        self.notify.title_change_notify.contains_all(ctype)
    }

    pub fn notify_offline(
        &self,
        ctype: ConcernType,
    ) -> bool {
        self.notify.offline_notify.contains_all(ctype)
    }
}
