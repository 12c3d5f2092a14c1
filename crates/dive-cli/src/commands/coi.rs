//! `dive select-coi`.

use dive_crypto::{coi_members, select_coi_for_resource};

pub fn select(releasability_to: &[String], explicit_coi: &[String]) {
    let coi = select_coi_for_resource(releasability_to, explicit_coi);
    match coi_members(&coi) {
        Some(members) => println!("{coi} ({})", members.join(", ")),
        None => println!("{coi}"),
    }
}
