//! Runtime configuration read from the environment.

use std::time::Duration;

use lotline_core::WarehouseId;

/// Allocation service tuning.
///
/// `WAREHOUSE_PRIORITY` is a comma-separated warehouse code list used when an
/// allocation request names no warehouse; earlier entries win ties.
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    pub warehouse_priority: Vec<WarehouseId>,
    /// Retries after losing an optimistic append race.
    pub max_retries: u32,
    /// Base backoff between retries (doubles per attempt).
    pub retry_backoff: Duration,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            warehouse_priority: Vec::new(),
            max_retries: 5,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

impl AllocationConfig {
    pub fn from_env() -> Self {
        let warehouse_priority = std::env::var("WAREHOUSE_PRIORITY")
            .map(|raw| parse_warehouse_priority(&raw))
            .unwrap_or_default();

        let max_retries = std::env::var("ALLOCATION_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);

        let retry_backoff = std::env::var("ALLOCATION_RETRY_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(25));

        Self {
            warehouse_priority,
            max_retries,
            retry_backoff,
        }
    }

    pub fn with_priority(mut self, warehouses: impl IntoIterator<Item = WarehouseId>) -> Self {
        self.warehouse_priority = warehouses.into_iter().collect();
        self
    }
}

fn parse_warehouse_priority(raw: &str) -> Vec<WarehouseId> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| WarehouseId::new(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_priority_list() {
        let parsed = parse_warehouse_priority("WH-EAST, WH-WEST,,WH-NORTH ");
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_str(), "WH-EAST");
        assert_eq!(parsed[2].as_str(), "WH-NORTH");
    }
}
