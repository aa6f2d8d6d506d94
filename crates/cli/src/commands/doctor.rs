use serde::Serialize;
use ticketry_core::config::{AppConfig, LoadOptions};
use ticketry_core::store::{StaffConfigStore, TicketStore};

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        return CommandResult::json(exit_code, &report);
    }
    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_tickets_file(&config));
            checks.push(check_staff_config(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["tickets_file", "staff_config"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_tickets_file(config: &AppConfig) -> DoctorCheck {
    let path = &config.storage.tickets_path;
    match TicketStore::open(path) {
        Ok(store) => DoctorCheck {
            name: "tickets_file",
            status: CheckStatus::Pass,
            details: format!(
                "`{}` loaded: {} tickets, {} open, next id {}",
                path.display(),
                store.len(),
                store.all_open().len(),
                store.next_id()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "tickets_file", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn check_staff_config(config: &AppConfig) -> DoctorCheck {
    match StaffConfigStore::open(&config.storage.staff_config_path) {
        Ok(store) if store.snapshot().is_configured() => DoctorCheck {
            name: "staff_config",
            status: CheckStatus::Pass,
            details: format!("{} staff roles configured", store.snapshot().staff_group_ids.len()),
        },
        Ok(_) => DoctorCheck {
            name: "staff_config",
            status: CheckStatus::Fail,
            details: format!(
                "no staff roles configured; run `{}setup @Role` in the server",
                config.chat.command_prefix
            ),
        },
        Err(error) => {
            DoctorCheck { name: "staff_config", status: CheckStatus::Fail, details: error.to_string() }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
