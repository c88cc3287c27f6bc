//! Messages: sending is final.

use reversible_types::{AuditAction, ResourceType};

use crate::policy::RollbackPolicy;
use crate::resources::ResourceModule;

pub const RESOURCE_TYPE: &str = "Message";

pub const SEND_WARNING: &str = "Messages cannot be unsent once delivered.";

/// Registers `Message::SEND` as irreversible so previews explain why.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageResource;

impl ResourceModule for MessageResource {
    fn resource_type(&self) -> ResourceType {
        ResourceType::new(RESOURCE_TYPE)
    }

    fn policies(&self) -> Vec<RollbackPolicy> {
        vec![
            RollbackPolicy::irreversible(
                RESOURCE_TYPE,
                AuditAction::Send,
                "Send a message to recipients",
                SEND_WARNING,
            )
            .requiring_capability("message:send"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_irreversible_without_executors() {
        let module = MessageResource;
        let policies = module.policies();
        assert_eq!(policies.len(), 1);
        assert!(policies[0].is_irreversible());
        assert_eq!(policies[0].refusal_message(), SEND_WARNING);
        assert!(module.executors().is_empty());
        assert!(module.state_reader().is_none());
    }
}
