mod m0001_sites_and_schedules;
mod m0002_scrape_queue;
mod m0003_domain_rate_limits;

use cetane::prelude::MigrationRegistry;

pub fn registry() -> MigrationRegistry {
    let mut reg = MigrationRegistry::new();
    reg.register(m0001_sites_and_schedules::migration());
    reg.register(m0002_scrape_queue::migration());
    reg.register(m0003_domain_rate_limits::migration());
    reg
}
