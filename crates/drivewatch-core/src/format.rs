//! Notification rendering.

use crate::model::{EventKind, Node, NodeKind};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Modifier shown when the remote does not report one.
pub const UNKNOWN_MODIFIER: &str = "UNKNOWN";

/// Everything one delivered change shows to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub event: EventKind,
    pub node_id: String,
    /// Change time rendered in the configured zone
    pub when: String,
    /// Zone label shown next to the time
    pub zone: Tz,
    pub path: String,
    pub kind: NodeKind,
    pub owners: Vec<String>,
    pub modified_by: String,
}

impl Notification {
    pub fn new(node: &Node, event: EventKind, time: DateTime<Utc>, zone: Tz, path: String) -> Self {
        Self {
            event,
            node_id: node.id.clone(),
            when: local_time(time, zone),
            zone,
            path,
            kind: node.kind(),
            owners: node.owners.clone(),
            modified_by: node
                .last_modifying_user
                .clone()
                .unwrap_or_else(|| UNKNOWN_MODIFIER.to_string()),
        }
    }

    pub fn owner_list(&self) -> String {
        self.owners.join(", ")
    }

    /// The chat message. Field order is fixed.
    pub fn render(&self) -> String {
        format!(
            "[{}] \n🕓 *Time:* {} ({})\n📁 *Path:* {}\n📦 *Type:* {}\n👤 *Owner:* {}\n✏️ *Modified by:* {}\n",
            self.event,
            self.when,
            self.zone.name(),
            self.path,
            self.kind,
            self.owner_list(),
            self.modified_by,
        )
    }
}

/// `time` in `zone`, as `YYYY-MM-DD HH:MM:SS`.
pub fn local_time(time: DateTime<Utc>, zone: Tz) -> String {
    time.with_timezone(&zone).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon_utc() -> DateTime<Utc> {
        "2024-01-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_local_time_conversion() {
        assert_eq!(local_time(noon_utc(), chrono_tz::America::Toronto), "2024-01-01 07:00:00");
        assert_eq!(local_time(noon_utc(), chrono_tz::Tz::UTC), "2024-01-01 12:00:00");
    }

    #[test]
    fn test_local_time_honours_daylight_saving() {
        let summer: DateTime<Utc> = "2024-07-01T12:00:00Z".parse().unwrap();
        assert_eq!(local_time(summer, chrono_tz::America::Toronto), "2024-07-01 08:00:00");
    }

    #[test]
    fn test_render_field_order() {
        let mut node = Node::file("X", "X", &["F1"]);
        node.owners = vec!["ana@example.com".into(), "bo@example.com".into()];
        node.last_modifying_user = Some("bo@example.com".into());

        let n = Notification::new(
            &node,
            EventKind::Modified,
            noon_utc(),
            chrono_tz::America::Toronto,
            "Team/Reports/X".into(),
        );

        assert_eq!(
            n.render(),
            "[MODIFIED] \n🕓 *Time:* 2024-01-01 07:00:00 (America/Toronto)\n📁 *Path:* Team/Reports/X\n📦 *Type:* FILE\n👤 *Owner:* ana@example.com, bo@example.com\n✏️ *Modified by:* bo@example.com\n"
        );
    }

    #[test]
    fn test_missing_modifier_is_unknown() {
        let node = Node::folder("F", "F", &["F0"]);
        let n = Notification::new(&node, EventKind::Trashed, noon_utc(), chrono_tz::Tz::UTC, "Team/F".into());

        assert_eq!(n.modified_by, "UNKNOWN");
        assert_eq!(n.owner_list(), "");
        assert!(n.render().starts_with("[TRASHED] \n"));
        assert!(n.render().contains("📦 *Type:* FOLDER\n"));
    }
}
