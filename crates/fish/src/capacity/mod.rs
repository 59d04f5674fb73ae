//! C5 — capacity accounting against local/remote provider budgets (§4.5).

mod usage;

pub use usage::UsageTracker;

use crate::model::Resources;

/// The five-step algorithm of §4.5, driver-agnostic: the driver supplies
/// its own headline totals (after its own `cpuAlter`/`ramAlter`), this
/// function does the tenancy/overbook arithmetic and division.
pub fn available_capacity(
    usage: &mut Resources,
    req: &Resources,
    total_cpu: u32,
    total_ram: u32,
    driver_cpu_overbook: u32,
    driver_ram_overbook: u32,
) -> i64 {
    // Step 2
    if req.cpu > total_cpu || req.ram > total_ram {
        return 0;
    }

    // Step 3 — first tenant sets the mode.
    if usage.cpu == 0 && usage.ram == 0 {
        usage.multitenancy = req.multitenancy;
        usage.cpu_overbook = req.cpu_overbook;
        usage.ram_overbook = req.ram_overbook;
    }

    // Step 4 — both sides must agree on multitenancy *and* on the overbook
    // figures to raise the effective totals.
    let (mut cpu_budget, mut ram_budget) = (total_cpu, total_ram);
    if usage.multitenancy && req.multitenancy {
        if usage.cpu_overbook == req.cpu_overbook {
            cpu_budget = cpu_budget.saturating_add(driver_cpu_overbook);
        }
        if usage.ram_overbook == req.ram_overbook {
            ram_budget = ram_budget.saturating_add(driver_ram_overbook);
        }
    }

    // Step 5
    let cpu_left = cpu_budget.saturating_sub(usage.cpu);
    let ram_left = ram_budget.saturating_sub(usage.ram);
    let by_cpu = (cpu_left / req.cpu) as i64;
    let by_ram = (ram_left / req.ram) as i64;
    by_cpu.min(by_ram)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(cpu: u32, ram: u32) -> Resources {
        Resources {
            cpu,
            ram,
            disks: Default::default(),
            network: String::new(),
            multitenancy: false,
            cpu_overbook: 0,
            ram_overbook: 0,
        }
    }

    #[test]
    fn denies_when_request_exceeds_totals() {
        let mut usage = resources(0, 0);
        let req = resources(8, 8);
        assert_eq!(available_capacity(&mut usage, &req, 4, 64, 0, 0), 0);
    }

    #[test]
    fn divides_remaining_budget_by_request() {
        let mut usage = resources(0, 0);
        let req = resources(2, 4);
        // 8 cpu / 2 = 4, 16 ram / 4 = 4 -> min = 4
        assert_eq!(available_capacity(&mut usage, &req, 8, 16, 0, 0), 4);
    }

    #[test]
    fn cpu_is_the_limiting_factor() {
        let mut usage = resources(0, 0);
        let req = resources(4, 2);
        // 8 cpu / 4 = 2, 16 ram / 2 = 8 -> min = 2
        assert_eq!(available_capacity(&mut usage, &req, 8, 16, 0, 0), 2);
    }

    #[test]
    fn overbook_applies_only_when_both_sides_agree() {
        let mut usage = resources(8, 8);
        usage.multitenancy = true;
        usage.cpu_overbook = 4;
        usage.ram_overbook = 0;

        let mut req = resources(2, 2);
        req.multitenancy = true;
        req.cpu_overbook = 4;
        req.ram_overbook = 0;

        // total cpu budget 8 + overbook 4 = 12, minus used 8 = 4 left / 2 = 2
        // total ram budget 8 + no overbook = 8, minus used 8 = 0 left / 2 = 0
        assert_eq!(available_capacity(&mut usage, &req, 8, 8, 4, 4), 0);
    }

    #[test]
    fn overbook_skipped_when_request_disagrees_on_multitenancy() {
        let mut usage = resources(8, 8);
        usage.multitenancy = true;

        let req = resources(2, 2); // multitenancy = false
        assert_eq!(available_capacity(&mut usage, &req, 8, 8, 4, 4), 0);
    }
}
