// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{EnumOption, FieldDependency, FieldKind, FieldSpec, ResourceSchema};

pub const DEFAULT_RESOURCE: &str = "daily-works";

const DEPARTMENTS: [(i64, &str); 4] = [
    (1, "Engineering"),
    (2, "Finance"),
    (3, "Human Resources"),
    (4, "Quality Control"),
];

const DESIGNATIONS: [(i64, &str); 6] = [
    (10, "Site Engineer"),
    (11, "Supervisor"),
    (12, "Accountant"),
    (13, "HR Officer"),
    (14, "QC Inspector"),
    (15, "Lab Technician"),
];

const STAFF: [(i64, &str); 5] = [
    (21, "Avery Rahman"),
    (22, "Jordan Chowdhury"),
    (23, "Riley Hossain"),
    (24, "Morgan Akter"),
    (25, "Quinn Islam"),
];

fn references(items: &[(i64, &str)]) -> Vec<EnumOption> {
    items
        .iter()
        .map(|(id, label)| EnumOption::reference(*id, label))
        .collect()
}

fn statuses(items: &[(&str, &str)]) -> Vec<EnumOption> {
    items
        .iter()
        .map(|(value, label)| EnumOption::status(value, label))
        .collect()
}

pub fn employees() -> ResourceSchema {
    ResourceSchema::new("employees", "Employees", "/employees")
        .field(FieldSpec::new("name", "Name", FieldKind::Text).required())
        .field(FieldSpec::new("email", "Email", FieldKind::Text).required())
        .field(FieldSpec::new("phone", "Phone", FieldKind::Text))
        .field(
            FieldSpec::new("department", "Department", FieldKind::Reference)
                .required()
                .with_options(references(&DEPARTMENTS)),
        )
        .field(
            FieldSpec::new("designation", "Designation", FieldKind::Reference)
                .with_options(references(&DESIGNATIONS)),
        )
        .field(FieldSpec::new("date_of_joining", "Joined", FieldKind::Date))
        .field(FieldSpec::new("active", "Active", FieldKind::Boolean))
        .dependency(FieldDependency::new("department", &["designation"]))
}

pub fn daily_works() -> ResourceSchema {
    ResourceSchema::new("daily-works", "Daily works", "/daily-works")
        .field(FieldSpec::new("date", "Date", FieldKind::Date).required())
        .field(FieldSpec::new("number", "RFI", FieldKind::Text).read_only())
        .field(
            FieldSpec::new("status", "Status", FieldKind::Status)
                .required()
                .with_options(statuses(&[
                    ("new", "New"),
                    ("in_progress", "In progress"),
                    ("completed", "Completed"),
                    ("resubmission", "Resubmission"),
                    ("emergency", "Emergency"),
                ])),
        )
        .field(
            FieldSpec::new("type", "Type", FieldKind::Status).with_options(statuses(&[
                ("embankment", "Embankment"),
                ("structure", "Structure"),
                ("pavement", "Pavement"),
            ])),
        )
        .field(FieldSpec::new("location", "Location", FieldKind::Text))
        .field(FieldSpec::new("description", "Description", FieldKind::Text))
        .field(
            FieldSpec::new("incharge", "In charge", FieldKind::Reference)
                .with_options(references(&STAFF)),
        )
        .field(
            FieldSpec::new("assigned", "Assigned", FieldKind::Reference)
                .with_options(references(&STAFF)),
        )
        .field(FieldSpec::new(
            "inspection_details",
            "Inspection",
            FieldKind::LongText,
        ))
        .field(
            FieldSpec::new("resubmission_count", "Resubmits", FieldKind::Integer).read_only(),
        )
        .dependency(FieldDependency::new("incharge", &["assigned"]))
}

pub fn letters() -> ResourceSchema {
    ResourceSchema::new("letters", "Letters", "/letters")
        .field(FieldSpec::new("memo_number", "Memo", FieldKind::Text).read_only())
        .field(FieldSpec::new("from", "From", FieldKind::Text).required())
        .field(FieldSpec::new("subject", "Subject", FieldKind::Text).required())
        .field(FieldSpec::new("received_date", "Received", FieldKind::Date))
        .field(
            FieldSpec::new("status", "Status", FieldKind::Status).with_options(statuses(&[
                ("received", "Received"),
                ("in_progress", "In progress"),
                ("responded", "Responded"),
                ("closed", "Closed"),
            ])),
        )
        .field(
            FieldSpec::new("handled_by", "Handled by", FieldKind::Reference)
                .with_options(references(&STAFF)),
        )
        .field(FieldSpec::new("need_reply", "Reply?", FieldKind::Boolean))
        .field(FieldSpec::new("remarks", "Remarks", FieldKind::LongText))
}

pub fn holidays() -> ResourceSchema {
    ResourceSchema::new("holidays", "Holidays", "/holidays")
        .field(FieldSpec::new("title", "Title", FieldKind::Text).required())
        .field(FieldSpec::new("from_date", "From", FieldKind::Date).required())
        .field(FieldSpec::new("to_date", "To", FieldKind::Date).required())
        .field(
            FieldSpec::new("type", "Type", FieldKind::Status).with_options(statuses(&[
                ("public", "Public"),
                ("optional", "Optional"),
            ])),
        )
        .field(FieldSpec::new("description", "Description", FieldKind::LongText))
        .field(FieldSpec::new("is_active", "Active", FieldKind::Boolean))
}

pub fn builtin_resources() -> Vec<ResourceSchema> {
    vec![daily_works(), employees(), letters(), holidays()]
}

pub fn find_resource<'a>(
    resources: &'a [ResourceSchema],
    name: &str,
) -> Option<&'a ResourceSchema> {
    resources.iter().find(|schema| schema.name == name)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_RESOURCE, builtin_resources, find_resource};

    #[test]
    fn builtin_schemas_are_valid() {
        for schema in builtin_resources() {
            schema
                .validate()
                .unwrap_or_else(|error| panic!("{}: {error}", schema.name));
        }
    }

    #[test]
    fn default_resource_exists() {
        let resources = builtin_resources();
        assert!(find_resource(&resources, DEFAULT_RESOURCE).is_some());
        assert!(find_resource(&resources, "payroll").is_none());
    }

    #[test]
    fn employee_department_clears_designation() {
        let resources = builtin_resources();
        let employees = find_resource(&resources, "employees").expect("employees schema");
        assert_eq!(employees.dependents_of("department"), vec!["designation"]);
    }
}
