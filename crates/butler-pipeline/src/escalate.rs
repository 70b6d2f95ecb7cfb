//! Acknowledgement wording for an escalated turn (spec §4.1 step 6:
//! "overwrite the outbound content with an acknowledgement template whose
//! wording depends on the priority").

use butler_escalation::Priority;

pub fn acknowledgement(priority: Priority) -> &'static str {
    match priority {
        Priority::Urgent => {
            "I'm connecting you with a member of our team right away — this has been flagged as urgent."
        }
        Priority::High => "I'm looping in a staff member to help with this as soon as possible.",
        Priority::Standard => "I've passed this along to our team and someone will follow up shortly.",
        Priority::Low => "Thanks for letting us know — a team member will follow up when available.",
    }
}
