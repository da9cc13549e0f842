use crate::controller::DeviceController;
use crate::error::FleetError;
use std::collections::HashMap;

/// Controllers in registration order, indexed by device name.
pub struct DeviceRegistry<L, S> {
    controllers: Vec<DeviceController<L, S>>,
    index: HashMap<String, usize>,
}

impl<L, S> Default for DeviceRegistry<L, S> {
    fn default() -> Self {
        Self {
            controllers: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<L, S> DeviceRegistry<L, S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|c| c.name())
    }

    pub fn get(&self, name: &str) -> Option<&DeviceController<L, S>> {
        self.index.get(name).map(|&i| &self.controllers[i])
    }

    pub fn register(&mut self, controller: DeviceController<L, S>) -> Result<(), FleetError> {
        let name = controller.name().to_string();
        if self.index.contains_key(&name) {
            return Err(FleetError::DuplicateDevice(name));
        }
        self.index.insert(name, self.controllers.len());
        self.controllers.push(controller);
        Ok(())
    }

    pub fn into_controllers(self) -> Vec<DeviceController<L, S>> {
        self.controllers
    }
}
