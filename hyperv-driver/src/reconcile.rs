//! Detection of configuration changes that need hypervisor calls.

use crate::command::HypervCommand;
use crate::types::VmDescriptor;

/// Fields that differ between the held descriptor and an update.
///
/// Each field holds the new value when it changed. Other descriptor fields
/// (name, switch, MAC, ...) are adopted as-is and never re-applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// New memory size in MB
    pub memory: Option<u64>,
    /// New processor count
    pub cpu: Option<u32>,
    /// New disk capacity in bytes
    pub disk_capacity: Option<u64>,
}

impl ConfigDiff {
    /// Compare two descriptors.
    pub fn between(current: &VmDescriptor, desired: &VmDescriptor) -> Self {
        Self {
            memory: (desired.memory != current.memory).then_some(desired.memory),
            cpu: (desired.cpu != current.cpu).then_some(desired.cpu),
            disk_capacity: (desired.disk_capacity != current.disk_capacity)
                .then_some(desired.disk_capacity),
        }
    }

    /// True when nothing needs to be applied.
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.cpu.is_none() && self.disk_capacity.is_none()
    }

    /// One command per changed field, in memory, CPU, disk order.
    ///
    /// Commands target the machine and disk of `current`.
    pub fn commands(&self, current: &VmDescriptor) -> Vec<HypervCommand> {
        let name = &current.machine_name;
        let mut commands = Vec::new();

        if let Some(memory_mb) = self.memory {
            commands.push(HypervCommand::SetMemory { name: name.clone(), memory_mb });
        }
        if let Some(count) = self.cpu {
            commands.push(HypervCommand::SetProcessorCount { name: name.clone(), count });
        }
        if let Some(size_bytes) = self.disk_capacity {
            commands.push(HypervCommand::ResizeVhd { path: current.disk_path(), size_bytes });
        }

        commands
    }
}
