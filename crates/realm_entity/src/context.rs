//! Read-only simulation context

use realm_core::{DisableCheck, StaticData, WorldConfig};

/// Borrowed view of the shared, read-only collaborators an entity update needs
#[derive(Clone, Copy)]
pub struct SimContext<'a> {
    pub config: &'a WorldConfig,
    pub data: &'a dyn StaticData,
    pub disables: &'a dyn DisableCheck,
}

impl<'a> SimContext<'a> {
    pub fn new(
        config: &'a WorldConfig,
        data: &'a dyn StaticData,
        disables: &'a dyn DisableCheck,
    ) -> Self {
        Self {
            config,
            data,
            disables,
        }
    }
}
