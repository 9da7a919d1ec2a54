//! Schedule resolution - pure construction of per-planning dispatch tables.

use std::collections::HashMap;

use chrono::NaiveDate;
use fleetsync_domain::constants::NO_PLANNING;
use fleetsync_domain::{
    ClockTime, Device, Layer, PayloadCommand, Planning, PlanningCommand, Schedule, ALL_WEEKDAYS,
};
use tracing::warn;

/// Build the per-planning, per-weekday command tables for one dispatch run.
///
/// Pure function: no side effects, deterministic for a given `today`. Each
/// planning's table is built exactly once, on first encounter; subsequent
/// devices referencing the same planning only append their id.
///
/// Off-days take precedence: a flagged day's list holds exactly the
/// full-day `{00:00, 24:00, planning.command_id}` payload and regular
/// schedule rows are never joined onto it.
pub fn resolve_schedules(
    layers: &[Layer],
    plannings: &[Planning],
    schedules: &[Schedule],
    devices: &[Device],
    today: NaiveDate,
) -> HashMap<String, PlanningCommand> {
    let layer_by_id: HashMap<&str, &Layer> =
        layers.iter().map(|layer| (layer.id.as_str(), layer)).collect();
    let planning_by_id: HashMap<&str, &Planning> =
        plannings.iter().map(|planning| (planning.id.as_str(), planning)).collect();

    let mut resolved: HashMap<String, PlanningCommand> = HashMap::new();

    for device in devices {
        let Some(layer_id) = device.layer_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };

        let Some(layer) = layer_by_id.get(layer_id) else {
            warn!(device_id = %device.id, layer_id, "device references an unknown layer");
            continue;
        };

        let Some(planning_id) = layer
            .planning_id
            .as_deref()
            .filter(|id| !id.is_empty() && *id != NO_PLANNING)
        else {
            continue;
        };

        if let Some(command) = resolved.get_mut(planning_id) {
            command.device_ids.push(device.id.clone());
            continue;
        }

        let Some(planning) = planning_by_id.get(planning_id) else {
            warn!(layer_id, planning_id, "layer references an unknown planning");
            continue;
        };

        let mut command = PlanningCommand::new(planning_id);
        command.device_ids.push(device.id.clone());

        // Inactive plannings keep empty command lists; no dispatch can
        // ever match them.
        if planning.is_active_on(today) {
            populate_days(&mut command, planning, schedules);
        }

        resolved.insert(planning_id.to_string(), command);
    }

    resolved
}

fn populate_days(command: &mut PlanningCommand, planning: &Planning, schedules: &[Schedule]) {
    for day in planning.day_off.days() {
        command
            .commands_by_day
            .entry(day)
            .or_default()
            .push(PayloadCommand::full_day(&planning.command_id));
    }

    for schedule in schedules.iter().filter(|s| s.planning_id == planning.id) {
        let payload = PayloadCommand {
            command_id: schedule.command_id.clone(),
            start: ClockTime::parse_or_midnight(schedule.start.as_deref()),
            end: ClockTime::parse_or_midnight(schedule.end.as_deref()),
        };

        for day in ALL_WEEKDAYS {
            let list = command.commands_by_day.entry(day).or_default();
            match list.first() {
                // Off-day override owns the day; never join regular rows
                Some(first) if first.is_full_day() => {}
                _ => list.push(payload.clone()),
            }
        }
    }
}
