// ── Alarm derivation from site state ──
//
// Agents B and C both derive discrete alarm codes from a site's reported
// state; C skips the battery rule. Codes are dotted, most-general-first,
// so sweep logic can classify by prefix.

use cellgrid_api::{AntennaPort, SiteState};

pub const MAINS_OFF: &str = "Mains.Off";
pub const SITE_DOWN: &str = "Site.Down";
pub const ANTENNA_A1_UNAVAILABLE: &str = "Antenna.A1.Unavailable";
pub const ANTENNA_A2_UNAVAILABLE: &str = "Antenna.A2.Unavailable";
pub const BATTERY_LOW_GRID_DOWN: &str = "Battery.Low.GridDown";

/// Battery percentage below which a site on battery is at risk.
pub const LOW_BATTERY_THRESHOLD: u8 = 40;

pub fn antenna_alarm(port: AntennaPort) -> &'static str {
    match port {
        AntennaPort::A1 => ANTENNA_A1_UNAVAILABLE,
        AntennaPort::A2 => ANTENNA_A2_UNAVAILABLE,
    }
}

/// The antenna named by an alarm code, if any.
pub fn antenna_for_alarm(code: &str) -> Option<AntennaPort> {
    match code {
        ANTENNA_A1_UNAVAILABLE => Some(AntennaPort::A1),
        ANTENNA_A2_UNAVAILABLE => Some(AntennaPort::A2),
        _ => None,
    }
}

/// True for alarm classes the mitigation sweep keeps working on.
pub fn is_actionable(code: &str) -> bool {
    code.starts_with("Mains.") || code == SITE_DOWN || code.starts_with("Antenna.")
}

/// Derive alarms from a site's state: mains, liveness, and antennas.
pub fn detect_alarms(site: &SiteState) -> Vec<String> {
    let mut alarms = Vec::new();
    if !site.mains.is_on() {
        alarms.push(MAINS_OFF.to_owned());
    }
    if !site.site_alive {
        alarms.push(SITE_DOWN.to_owned());
    }
    for port in AntennaPort::ALL {
        if !site.antenna(port).is_available() {
            alarms.push(antenna_alarm(port).to_owned());
        }
    }
    alarms
}

/// [`detect_alarms`] plus the battery-at-risk rule: mains off while the
/// battery is below [`LOW_BATTERY_THRESHOLD`].
pub fn detect_alarms_with_battery(site: &SiteState) -> Vec<String> {
    let mut alarms = detect_alarms(site);
    if !site.mains.is_on() && site.battery_percent < LOW_BATTERY_THRESHOLD {
        alarms.push(BATTERY_LOW_GRID_DOWN.to_owned());
    }
    alarms
}
