//! Static endpoint tables, one per provider.
//!
//! Every provider quirk is a flag on an [`EndpointSpec`] row keyed by
//! category and operation. Adapters look rows up; they never compare
//! endpoint names at runtime.

use reqwest::Method;

use crate::vending::types::{Category, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Purchase,
    Validate,
    Catalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

impl Verb {
    pub fn method(&self) -> Method {
        match self {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    pub verb: Verb,
    /// Relative to the provider base URL, no leading slash.
    pub path: &'static str,
    /// Send the API key a second time in `Authorization-Token`.
    pub duplicate_auth_header: bool,
    /// Lower-case the carrier/biller code before sending it.
    pub lowercase_code: bool,
}

const fn post(path: &'static str) -> EndpointSpec {
    EndpointSpec {
        verb: Verb::Post,
        path,
        duplicate_auth_header: false,
        lowercase_code: false,
    }
}

const fn get(path: &'static str) -> EndpointSpec {
    EndpointSpec {
        verb: Verb::Get,
        path,
        duplicate_auth_header: false,
        lowercase_code: false,
    }
}

const fn dup_auth(spec: EndpointSpec) -> EndpointSpec {
    EndpointSpec {
        duplicate_auth_header: true,
        ..spec
    }
}

const fn lowercase(spec: EndpointSpec) -> EndpointSpec {
    EndpointSpec {
        lowercase_code: true,
        ..spec
    }
}

pub struct CapabilityTable {
    pub provider: ProviderId,
    rows: &'static [(Category, Operation, EndpointSpec)],
}

impl CapabilityTable {
    pub fn endpoint(&self, category: Category, operation: Operation) -> Option<&EndpointSpec> {
        self.rows
            .iter()
            .find(|(c, o, _)| *c == category && *o == operation)
            .map(|(_, _, spec)| spec)
    }

    /// A category is supported when the provider can sell it.
    pub fn supports(&self, category: Category) -> bool {
        self.endpoint(category, Operation::Purchase).is_some()
    }

    pub fn supported_categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.supports(*c))
            .collect()
    }
}

pub static PROVIDER_A: CapabilityTable = CapabilityTable {
    provider: ProviderId::ProviderA,
    rows: &[
        (Category::Airtime, Operation::Purchase, lowercase(post("airtime"))),
        (Category::Data, Operation::Purchase, post("data")),
        (Category::Data, Operation::Catalog, get("services")),
        (Category::Electricity, Operation::Purchase, dup_auth(post("payelectric"))),
        (Category::Electricity, Operation::Validate, dup_auth(post("validatemeter"))),
        (Category::Cable, Operation::Purchase, dup_auth(post("subcable"))),
        (
            Category::Cable,
            Operation::Validate,
            lowercase(dup_auth(post("validatecable"))),
        ),
        (Category::Cable, Operation::Catalog, get("services")),
        (Category::Education, Operation::Purchase, post("exampin")),
        (Category::Education, Operation::Catalog, get("services")),
    ],
};

pub static PROVIDER_B: CapabilityTable = CapabilityTable {
    provider: ProviderId::ProviderB,
    rows: &[
        (Category::Data, Operation::Purchase, post("data/buy")),
        (Category::Data, Operation::Catalog, get("data/plans")),
        (Category::Electricity, Operation::Purchase, post("electricity")),
        (Category::Electricity, Operation::Validate, post("electricity/validate")),
        (Category::Cable, Operation::Purchase, post("tv")),
        (Category::Cable, Operation::Validate, post("tv/verify")),
        (Category::Cable, Operation::Catalog, get("tv")),
    ],
};

pub fn table_for(provider: ProviderId) -> &'static CapabilityTable {
    match provider {
        ProviderId::ProviderA => &PROVIDER_A,
        ProviderId::ProviderB => &PROVIDER_B,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_a_duplicate_header_endpoints() {
        let flagged: Vec<&str> = PROVIDER_A
            .rows
            .iter()
            .filter(|(_, _, spec)| spec.duplicate_auth_header)
            .map(|(_, _, spec)| spec.path)
            .collect();
        assert_eq!(
            flagged,
            vec!["payelectric", "validatemeter", "subcable", "validatecable"]
        );
    }

    #[test]
    fn provider_a_lowercase_only_for_airtime_and_cable_validation() {
        let flagged: Vec<(Category, Operation)> = PROVIDER_A
            .rows
            .iter()
            .filter(|(_, _, spec)| spec.lowercase_code)
            .map(|(c, o, _)| (*c, *o))
            .collect();
        assert_eq!(
            flagged,
            vec![
                (Category::Airtime, Operation::Purchase),
                (Category::Cable, Operation::Validate)
            ]
        );
    }

    #[test]
    fn provider_b_has_no_quirks() {
        assert!(PROVIDER_B
            .rows
            .iter()
            .all(|(_, _, spec)| !spec.duplicate_auth_header && !spec.lowercase_code));
    }

    #[test]
    fn support_sets() {
        assert_eq!(PROVIDER_A.supported_categories(), Category::ALL.to_vec());
        assert_eq!(
            PROVIDER_B.supported_categories(),
            vec![Category::Data, Category::Electricity, Category::Cable]
        );
        assert!(PROVIDER_B.endpoint(Category::Airtime, Operation::Purchase).is_none());
    }
}
