//! Employee commands.

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use vp_core::{EmployeeId, EmployeeProfile, EmployeeUpdate, Role};

use super::util::{open_database, operator, print_json, require_admin};
use crate::Config;

/// Employee subcommands.
#[derive(Debug, Subcommand)]
pub enum EmployeeCommand {
    /// Create an employee on first sign-in, or refresh their profile.
    Sync {
        /// Id issued by the identity provider.
        id: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
        /// Only applied when the employee is created.
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        weekly_hours: Option<f64>,
        #[arg(long)]
        daily_capacity: Option<f64>,
    },
    /// List employees.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one employee.
    Show { id: String },
    /// Change an employee's profile. Changing the role requires an admin.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        role: Option<Role>,
        /// Also recomputes daily capacity unless `--daily-capacity` is given.
        #[arg(long)]
        weekly_hours: Option<f64>,
        #[arg(long)]
        daily_capacity: Option<f64>,
    },
    /// Delete an employee, detaching their assignments.
    Delete { id: String },
}

pub fn run<W: Write>(writer: &mut W, command: &EmployeeCommand, config: &Config) -> Result<()> {
    match command {
        EmployeeCommand::Sync {
            id,
            email,
            name,
            role,
            color,
            weekly_hours,
            daily_capacity,
        } => {
            let id = EmployeeId::new(id.as_str())?;
            let profile = EmployeeProfile {
                email: email.clone(),
                full_name: name.clone(),
                role: *role,
                color: color.clone(),
                weekly_hours: *weekly_hours,
                daily_capacity: *daily_capacity,
            };
            let mut db = open_database(config)?;
            let (employee, created) = db.sync_profile(&id, &profile)?;
            let verb = if created { "Created" } else { "Updated" };
            writeln!(
                writer,
                "{verb} employee {} ({}, {:.1} h/day)",
                employee.id, employee.role, employee.daily_capacity
            )?;
            Ok(())
        }
        EmployeeCommand::List { json } => {
            let db = open_database(config)?;
            let employees = db.list_employees()?;
            if *json {
                return print_json(writer, &employees);
            }
            if employees.is_empty() {
                writeln!(writer, "No employees.")?;
            }
            for employee in &employees {
                writeln!(
                    writer,
                    "{:<12}  {:<8}  {:>5.1} h/week  {:>4.1} h/day  {}",
                    employee.id,
                    employee.role,
                    employee.weekly_hours,
                    employee.daily_capacity,
                    employee.full_name.as_deref().unwrap_or("-")
                )?;
            }
            Ok(())
        }
        EmployeeCommand::Show { id } => {
            let db = open_database(config)?;
            let employee = db.get_employee(&EmployeeId::new(id.as_str())?)?;
            print_json(writer, &employee)
        }
        EmployeeCommand::Update {
            id,
            name,
            color,
            role,
            weekly_hours,
            daily_capacity,
        } => {
            let update = EmployeeUpdate {
                full_name: name.clone(),
                color: color.clone(),
                role: *role,
                weekly_hours: *weekly_hours,
                daily_capacity: *daily_capacity,
            };
            let id = EmployeeId::new(id.as_str())?;
            let mut db = open_database(config)?;
            let principal = operator(&db, config)?;
            // Employees may edit their own profile, except for the role.
            if update.changes_role() || principal.subject != id {
                principal.require_admin()?;
            }
            let employee = db.update_employee(&id, &update)?;
            print_json(writer, &employee)
        }
        EmployeeCommand::Delete { id } => {
            let mut db = open_database(config)?;
            require_admin(&db, config)?;
            db.delete_employee(&EmployeeId::new(id.as_str())?)?;
            writeln!(writer, "Deleted employee {id}")?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vp_core::AuthError;
    use vp_db::Database;

    use crate::commands::util::test_support::{add_employee, config};

    fn update(id: &str, role: Option<Role>, weekly_hours: Option<f64>) -> EmployeeCommand {
        EmployeeCommand::Update {
            id: id.to_string(),
            name: None,
            color: None,
            role,
            weekly_hours,
            daily_capacity: None,
        }
    }

    #[test]
    fn sync_creates_with_defaults_then_updates() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), None);
        let sync = |name: &str| EmployeeCommand::Sync {
            id: "emp-a".to_string(),
            email: Some("a@example.com".to_string()),
            name: Some(name.to_string()),
            role: None,
            color: None,
            weekly_hours: None,
            daily_capacity: None,
        };

        let mut output = Vec::new();
        run(&mut output, &sync("Alice"), &config).unwrap();
        run(&mut output, &sync("Alice B."), &config).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "Created employee emp-a (employee, 7.6 h/day)\n\
             Updated employee emp-a (employee, 7.6 h/day)\n"
        );

        let db = Database::open(&config.database_path).unwrap();
        let employee = db.get_employee(&EmployeeId::new("emp-a").unwrap()).unwrap();
        assert_eq!(employee.full_name.as_deref(), Some("Alice B."));
        assert_eq!(employee.color, "#3B82F6");
    }

    #[test]
    fn weekly_hours_update_recomputes_capacity() {
        let temp = tempfile::tempdir().unwrap();
        let config = config(temp.path(), Some("emp-a"));
        add_employee(&config, "emp-a", Role::Employee);

        let mut output = Vec::new();
        run(&mut output, &update("emp-a", None, Some(30.0)), &config).unwrap();
        let employee: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(employee["weekly_hours"], 30.0);
        assert_eq!(employee["daily_capacity"], 6.0);
    }

    #[test]
    fn role_change_requires_admin() {
        let temp = tempfile::tempdir().unwrap();
        let worker = config(temp.path(), Some("emp-a"));
        add_employee(&worker, "emp-a", Role::Employee);
        add_employee(&worker, "boss", Role::Admin);

        let err = run(&mut Vec::new(), &update("emp-a", Some(Role::Admin), None), &worker)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuthError>(),
            Some(AuthError::NotAdmin { .. })
        ));

        let admin = config(temp.path(), Some("boss"));
        run(&mut Vec::new(), &update("emp-a", Some(Role::Admin), None), &admin).unwrap();
        let db = Database::open(&admin.database_path).unwrap();
        let promoted = db.get_employee(&EmployeeId::new("emp-a").unwrap()).unwrap();
        assert_eq!(promoted.role, Role::Admin);
    }

    #[test]
    fn employees_cannot_edit_each_other() {
        let temp = tempfile::tempdir().unwrap();
        let worker = config(temp.path(), Some("emp-a"));
        add_employee(&worker, "emp-a", Role::Employee);
        add_employee(&worker, "emp-b", Role::Employee);

        let err = run(&mut Vec::new(), &update("emp-b", None, Some(20.0)), &worker).unwrap_err();
        assert!(err.downcast_ref::<AuthError>().is_some());
    }

    #[test]
    fn delete_requires_admin() {
        let temp = tempfile::tempdir().unwrap();
        let worker = config(temp.path(), Some("emp-a"));
        add_employee(&worker, "emp-a", Role::Employee);
        add_employee(&worker, "emp-b", Role::Employee);

        let command = EmployeeCommand::Delete {
            id: "emp-b".to_string(),
        };
        assert!(run(&mut Vec::new(), &command, &worker).is_err());

        add_employee(&worker, "boss", Role::Admin);
        let admin = config(temp.path(), Some("boss"));
        let mut output = Vec::new();
        run(&mut output, &command, &admin).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Deleted employee emp-b\n");
    }
}
