//! Module objects: a name plus a namespace dict.

use crate::{intern::StringId, types::Dict};

/// A module: the scope that `LOAD_GLOBAL`/`STORE_GLOBAL` resolve against.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct Module {
    name: StringId,
    dict: Dict,
}

impl Module {
    #[must_use]
    pub fn new(name: StringId) -> Self {
        Self {
            name,
            dict: Dict::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> StringId {
        self.name
    }

    #[must_use]
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut Dict {
        &mut self.dict
    }
}
