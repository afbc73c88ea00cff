//! Explicit update commands.
//!
//! Each command lists the fields a caller may change. `apply` produces the
//! updated entity and enforces the recomputation rules, so nothing is set by
//! field name at runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    Employee, Intervention, InterventionItem, check_interval, daily_capacity_for, derive_price,
};
use crate::status::{InterventionStatus, Role};
use crate::types::{ClientId, EmployeeId, ValidationError, non_blank, non_negative};

/// Changes to an employee profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub weekly_hours: Option<f64>,
    #[serde(default)]
    pub daily_capacity: Option<f64>,
}

impl EmployeeUpdate {
    /// Whether the update touches the role, which only admins may change.
    pub const fn changes_role(&self) -> bool {
        self.role.is_some()
    }

    /// Applies the update.
    ///
    /// A new `weekly_hours` without an explicit `daily_capacity` recomputes the
    /// daily capacity as `weekly_hours / 5`.
    pub fn apply(&self, employee: &Employee) -> Result<Employee, ValidationError> {
        let mut updated = employee.clone();
        if let Some(name) = &self.full_name {
            updated.full_name = non_blank(Some(name.as_str()));
        }
        if let Some(color) = non_blank(self.color.as_deref()) {
            updated.color = color;
        }
        if let Some(role) = self.role {
            updated.role = role;
        }
        if let Some(weekly) = self.weekly_hours {
            updated.weekly_hours = non_negative("weekly hours", weekly)?;
            updated.daily_capacity = daily_capacity_for(updated.weekly_hours);
        }
        if let Some(daily) = self.daily_capacity {
            updated.daily_capacity = non_negative("daily capacity", daily)?;
        }
        Ok(updated)
    }
}

/// Changes to an intervention.
///
/// Doubly optional fields distinguish "leave unchanged" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterventionUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<InterventionStatus>,
    #[serde(default)]
    pub price_estimated: Option<Option<f64>>,
    #[serde(default)]
    pub is_invoice: Option<bool>,
    #[serde(default)]
    pub client_id: Option<Option<ClientId>>,
    #[serde(default)]
    pub employee_ids: Option<Vec<EmployeeId>>,
    #[serde(default)]
    pub items: Option<Vec<InterventionItem>>,
}

impl InterventionUpdate {
    /// Applies the update and re-checks the intervention invariants.
    ///
    /// Without an explicit price the estimate follows the items: clearing the
    /// price or replacing the items re-derives it.
    pub fn apply(&self, intervention: &Intervention) -> Result<Intervention, ValidationError> {
        let mut updated = intervention.clone();
        if let Some(title) = &self.title {
            updated.title = non_blank(Some(title.as_str()))
                .ok_or(ValidationError::Empty { field: "title" })?;
        }
        if let Some(description) = &self.description {
            updated.description = non_blank(description.as_deref());
        }
        if let Some(start) = self.start_time {
            updated.start_time = start;
        }
        if let Some(end) = self.end_time {
            updated.end_time = end;
        }
        check_interval("intervention", updated.start_time, updated.end_time)?;
        if let Some(status) = self.status {
            updated.status = status;
        }
        if let Some(is_invoice) = self.is_invoice {
            updated.is_invoice = is_invoice;
        }
        if let Some(client_id) = &self.client_id {
            updated.client_id.clone_from(client_id);
        }
        if let Some(employee_ids) = &self.employee_ids {
            let mut ids = employee_ids.clone();
            ids.sort();
            ids.dedup();
            updated.employee_ids = ids;
        }
        if let Some(items) = &self.items {
            for item in items {
                non_negative("item price", item.price)?;
            }
            updated.items.clone_from(items);
        }
        if let Some(price) = self.price_estimated {
            if let Some(value) = price {
                non_negative("estimated price", value)?;
            }
            updated.price_is_explicit = price.is_some();
            updated.price_estimated = derive_price(price, &updated.items);
        } else if self.items.is_some() && !updated.price_is_explicit {
            updated.price_estimated = derive_price(None, &updated.items);
        }
        Ok(updated)
    }
}
