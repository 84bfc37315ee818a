use std::fmt;

use crate::alarm::model::Alarm;

pub const CANCEL_BUTTON_TAG: &str = "alarm-row__cancel-button";

/// Interactive elements a click can land on, keyed by tag.
const AFFORDANCES: &[(&str, Affordance)] = &[(CANCEL_BUTTON_TAG, Affordance::CancelRow)];

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Affordance {
    CancelRow,
}

impl Affordance {
    pub fn from_tag(tag: &str) -> Option<Self> {
        AFFORDANCES
            .iter()
            .find(|(known, _)| *known == tag)
            .map(|(_, affordance)| *affordance)
    }
}

/// Where a click on the alarm display landed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClickTarget {
    pub tag: String,
    /// Name carried by the enclosing row, if the click was inside one.
    pub row_name: Option<String>,
}

impl ClickTarget {
    pub fn new(tag: impl Into<String>, row_name: Option<String>) -> Self {
        Self {
            tag: tag.into(),
            row_name,
        }
    }

    pub fn affordance(&self) -> Option<Affordance> {
        Affordance::from_tag(&self.tag)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRow {
    pub name: String,
    pub body: String,
    pub is_last: bool,
}

impl AlarmRow {
    pub fn render(alarm: &Alarm, is_last: bool) -> Self {
        let json = serde_json::to_string_pretty(alarm)
            .unwrap_or_else(|err| format!("<unserializable: {err}>"));
        let separator = if is_last { "" } else { "," };
        Self {
            name: alarm.name.clone(),
            body: format!("{json}{separator}"),
            is_last,
        }
    }

    pub fn cancel_target(&self) -> ClickTarget {
        ClickTarget::new(CANCEL_BUTTON_TAG, Some(self.name.clone()))
    }
}

impl fmt::Display for AlarmRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [cancel]", self.body)
    }
}

/// Renders alarms in the given order, marking the final row.
pub fn render_rows(alarms: &[Alarm]) -> Vec<AlarmRow> {
    let last = alarms.len().saturating_sub(1);
    alarms
        .iter()
        .enumerate()
        .map(|(index, alarm)| AlarmRow::render(alarm, index == last))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(name: &str) -> Alarm {
        Alarm {
            name: name.to_string(),
            scheduled_time: 1_000.0,
            period_in_minutes: None,
        }
    }

    #[test]
    fn renders_one_row_per_alarm_and_marks_the_last() {
        let rows = render_rows(&[alarm("a"), alarm("b"), alarm("c")]);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
        assert!(rows[0].body.ends_with("},"));
        assert!(rows[1].body.ends_with("},"));
        assert!(rows[2].body.ends_with('}'));
        assert_eq!(
            rows.iter().map(|r| r.is_last).collect::<Vec<_>>(),
            [false, false, true]
        );
    }

    #[test]
    fn empty_alarm_set_renders_nothing() {
        assert!(render_rows(&[]).is_empty());
    }

    #[test]
    fn row_body_carries_camel_case_fields() {
        let row = AlarmRow::render(
            &Alarm {
                name: "wake".to_string(),
                scheduled_time: 5.0,
                period_in_minutes: Some(10.0),
            },
            true,
        );
        assert!(row.body.contains("\"scheduledTime\""));
        assert!(row.body.contains("\"periodInMinutes\""));
        assert!(row.to_string().ends_with("[cancel]"));
    }

    #[test]
    fn cancel_target_resolves_to_cancel_affordance() {
        let row = AlarmRow::render(&alarm("wake"), true);
        let target = row.cancel_target();
        assert_eq!(target.affordance(), Some(Affordance::CancelRow));
        assert_eq!(target.row_name.as_deref(), Some("wake"));
    }

    #[test]
    fn unknown_tags_have_no_affordance() {
        assert_eq!(Affordance::from_tag("alarm-row"), None);
        assert_eq!(
            Affordance::from_tag(CANCEL_BUTTON_TAG),
            Some(Affordance::CancelRow)
        );
    }
}
