//! Table layouts of the registry entities.

use registry_core::{Auth, Job, RegionalSystem, System, Tenant};

use super::{Resource, TableSchema, UniqueConstraint};

pub static TENANTS: TableSchema = TableSchema {
    name: "tenants",
    primary_key: &["id"],
    unique: &[],
};

pub static SYSTEMS: TableSchema = TableSchema {
    name: "systems",
    primary_key: &["id"],
    unique: &[UniqueConstraint {
        name: "systems_external_id_type",
        fields: &["external_id", "system_type"],
    }],
};

pub static REGIONAL_SYSTEMS: TableSchema = TableSchema {
    name: "regional_systems",
    primary_key: &["system_id", "region"],
    unique: &[],
};

pub static AUTHS: TableSchema = TableSchema {
    name: "auths",
    primary_key: &["external_id"],
    unique: &[],
};

pub static JOBS: TableSchema = TableSchema {
    name: "jobs",
    primary_key: &["id"],
    unique: &[],
};

impl Resource for Tenant {
    const SCHEMA: &'static TableSchema = &TENANTS;

    fn key(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl Resource for System {
    const SCHEMA: &'static TableSchema = &SYSTEMS;

    fn key(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl Resource for RegionalSystem {
    const SCHEMA: &'static TableSchema = &REGIONAL_SYSTEMS;

    fn key(&self) -> Vec<String> {
        vec![self.system_id.clone(), self.region.clone()]
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl Resource for Auth {
    const SCHEMA: &'static TableSchema = &AUTHS;

    fn key(&self) -> Vec<String> {
        vec![self.external_id.clone()]
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl Resource for Job {
    const SCHEMA: &'static TableSchema = &JOBS;

    fn key(&self) -> Vec<String> {
        vec![self.id.clone()]
    }

    fn created_at(&self) -> i64 {
        self.created_at
    }
}
