use crate::message::MessageType;

/// Resolves message type ids to schema names.
pub trait MessageCatalog: Send + Sync {
    fn name_of(&self, type_id: u16) -> Option<&'static str>;

    fn resolves(&self, type_id: u16) -> bool {
        self.name_of(type_id).is_some()
    }
}

/// The KeepKey device protocol's message table.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepKeyCatalog;

impl MessageCatalog for KeepKeyCatalog {
    fn name_of(&self, type_id: u16) -> Option<&'static str> {
        MessageType::from_id(type_id).map(MessageType::name)
    }
}
