use oyster_rs::test_support::default_config;
use oyster_rs::{IdentityRecord, Resolver, REF_ID};

pub fn person_resolver() -> Resolver {
    Resolver::new(default_config()).expect("default config builds")
}

/// Record with the person attributes used by `default_config`; blank fields are omitted
#[allow(dead_code)]
pub fn person(
    resolver: &Resolver,
    ref_id: &str,
    first: &str,
    last: &str,
    ssn: &str,
    dob: &str,
) -> IdentityRecord {
    resolver
        .record([
            (REF_ID, ref_id),
            ("first", first),
            ("last", last),
            ("ssn", ssn),
            ("dob", dob),
        ])
        .expect("person attributes are in the schema")
}
