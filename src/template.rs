//! Built-in required task template.
//!
//! Required tasks are always shown first in their phase, in template order.
//! They are never stored remotely; stored documents only hold the custom tasks.

use std::collections::BTreeMap;

use crate::fields::Phase;
use crate::task::Task;

const SITES: [&str; 3] = ["Waimea", "CMP", "Hanalei"];

const OPENING: [(&str, &str, &str); 14] = [
    ("1", "Clock In", "Use the Toast app to clock in for your shift"),
    ("2", "Count Both Drawers", "Count all cash in both registers and record totals"),
    ("3", "Turn On Lights and AC/Fans", "Ensure all work areas and guest areas are well-lit and ventilated"),
    ("4", "Set Up Sanitizer Rags and Bucket", "Prepare sanitizer solution according to guidelines"),
    ("5", "Run Prep List", "Complete all necessary food and ingredient preparation"),
    ("6", "Set Up Pouring Station", "Organize syrups, toppings, and prepare cups and lids"),
    ("7", "Prepare Ice Blocks", "Retrieve ice blocks from freezer and prepare for shaving"),
    ("8", "Set Up Shaving Station", "Clean and prepare ice shaving area and equipment"),
    ("9", "Check Shave Machines", "Test shave machines and ensure proper operation"),
    ("10", "Clean Guest Area", "Wipe down tables, chairs, and ensure dining area is presentable"),
    ("11", "Set Up Toast KDS and Connect Display", "Ensure order system is operational and visible to staff"),
    ("12", "Set Out Napkins, Spoons, and Straws", "Stock all customer service items at service stations"),
    ("13", "Play JoJo's Music", "Start designated music playlist on store sound system"),
    ("14", "Turn On Open Sign and Open Shop", "Activate open sign and unlock doors at scheduled opening time"),
];

// Per-site hints for template tasks that have them.
fn site_hints(id: &str) -> Option<[&'static str; 3]> {
    match id {
        "3" => Some(["Turn on both ACs", "Turn on fans only", "Turn on fans"]),
        _ => None,
    }
}

/// Required tasks of a phase, freshly built with no status.
pub fn required_tasks(phase: Phase) -> Vec<Task> {
    match phase {
        Phase::Opening => OPENING
            .iter()
            .map(|&(id, name, description)| {
                let hints = site_hints(id).unwrap_or(["", "", ""]);
                let sub_text: BTreeMap<String, String> = SITES
                    .iter()
                    .zip(hints)
                    .map(|(site, hint)| (site.to_string(), hint.to_string()))
                    .collect();
                Task {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: Some(description.to_string()),
                    sub_text,
                    status: None,
                    completed_by: None,
                    required: true,
                    sub_tasks: None,
                    external_ref: None,
                }
            })
            .collect(),
        Phase::Prep | Phase::Mid | Phase::Closing => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_template_is_ordered_and_required() {
        let tasks = required_tasks(Phase::Opening);
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let expected: Vec<String> = (1..=14).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(tasks.iter().all(|t| t.required && t.status.is_none()));
        assert_eq!(tasks[2].hint_for("CMP"), Some("Turn on fans only"));
    }

    #[test]
    fn test_other_phases_have_no_template() {
        for phase in [Phase::Prep, Phase::Mid, Phase::Closing] {
            assert!(required_tasks(phase).is_empty());
        }
    }
}
