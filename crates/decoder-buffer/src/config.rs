// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffer pool configuration loaded from TOML files or constructed
//! programmatically.
//!
//! # TOML Format
//! ```toml
//! using_memory_pool = true
//! allocate_on_demand = false
//! initial_capacity = "16M"
//! allocation_unit = "4M"
//! small_allocation_threshold = 512
//!
//! [[budgets]]
//! codec = "vp9"
//! max_width = 3840
//! max_height = 2160
//! max_bits_per_pixel = 10
//! capacity = "80M"
//! ```
//!
//! Omitted fields take their defaults; an omitted `budgets` table uses
//! [`default_budget_rules`].

use crate::capabilities::{default_budget_rules, lookup_budget, DEFAULT_SMALL_ALLOCATION_THRESHOLD};
use crate::{BudgetRule, BufferAllocator, BufferError, ByteSize, PlatformCapabilities, VideoConfig};
use reuse_allocator::{FallbackAllocator, SystemAllocator};
use std::path::Path;
use std::sync::Arc;

/// Platform policy for the decoder buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BufferPoolConfig {
    /// Whether buffers come from a pool. When false every buffer is a
    /// direct allocation.
    pub using_memory_pool: bool,
    /// Create the pool on first allocation and release it when it drains.
    pub allocate_on_demand: bool,
    /// Bytes reserved when the pool is created.
    pub initial_capacity: ByteSize,
    /// Growth granularity of the arena.
    pub allocation_unit: ByteSize,
    /// Requests below this many bytes are placed from the low end.
    pub small_allocation_threshold: usize,
    /// Budget table, searched in order.
    pub budgets: Vec<BudgetRule>,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            using_memory_pool: true,
            allocate_on_demand: false,
            initial_capacity: ByteSize::from_mb(16),
            allocation_unit: ByteSize::from_mb(4),
            small_allocation_threshold: DEFAULT_SMALL_ALLOCATION_THRESHOLD,
            budgets: default_budget_rules(),
        }
    }
}

impl BufferPoolConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, BufferError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BufferError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, BufferError> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| BufferError::ConfigError(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, BufferError> {
        toml::to_string_pretty(self)
            .map_err(|e| BufferError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Checks that the budget table makes sense.
    pub fn validate(&self) -> Result<(), BufferError> {
        for (i, rule) in self.budgets.iter().enumerate() {
            if rule.max_width == 0 || rule.max_height == 0 {
                return Err(BufferError::ConfigError(format!(
                    "budget rule {i} has a zero resolution limit"
                )));
            }
            if rule.capacity.as_bytes() == 0 {
                return Err(BufferError::ConfigError(format!(
                    "budget rule {i} has a zero capacity"
                )));
            }
        }
        Ok(())
    }

    /// Creates the allocator this configuration asks for, backed by the
    /// system allocator.
    pub fn create_allocator(self) -> Result<Box<dyn BufferAllocator>, BufferError> {
        self.create_allocator_with(Arc::new(SystemAllocator))
    }

    /// Creates the allocator this configuration asks for, backed by
    /// `fallback`.
    pub fn create_allocator_with(
        self,
        fallback: Arc<dyn FallbackAllocator>,
    ) -> Result<Box<dyn BufferAllocator>, BufferError> {
        crate::create_allocator(Arc::new(self), fallback)
    }
}

impl PlatformCapabilities for BufferPoolConfig {
    fn uses_memory_pool(&self) -> bool {
        self.using_memory_pool
    }

    fn allocates_pool_on_demand(&self) -> bool {
        self.allocate_on_demand
    }

    fn initial_capacity(&self) -> usize {
        self.initial_capacity.as_bytes()
    }

    fn allocation_unit(&self) -> usize {
        self.allocation_unit.as_bytes()
    }

    fn small_allocation_threshold(&self) -> usize {
        self.small_allocation_threshold
    }

    fn max_buffer_capacity(&self, video: &VideoConfig) -> usize {
        lookup_budget(&self.budgets, video)
    }
}
