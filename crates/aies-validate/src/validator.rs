use aies_core::{wire, DeviceId, ScheduleDocument};
use serde_json::Value;
use tracing::debug;

use crate::error::{FieldIssue, ValidationReport};
use crate::schema::Schema;

/// Outcome of checking one candidate document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(ValidationReport),
}

impl ValidationResult {
    fn from_issues(issues: Vec<FieldIssue>) -> Self {
        if issues.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(ValidationReport { issues })
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn issues(&self) -> &[FieldIssue] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(report) => &report.issues,
        }
    }

    pub fn into_result(self) -> Result<(), ValidationReport> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid(report) => Err(report),
        }
    }
}

/// Checks candidates against a structural schema plus the model invariants.
///
/// Pure: never mutates its input and has no side effects, so it is safe to
/// run speculatively before committing anything.
#[derive(Debug, Clone)]
pub struct Validator {
    schema: Schema,
}

impl Validator {
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Validator over the built-in schema.
    pub fn builtin() -> crate::error::Result<Self> {
        Ok(Self::new(Schema::builtin()?))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate a typed document.
    pub fn validate(&self, candidate: &ScheduleDocument) -> ValidationResult {
        let mut issues = match wire::to_value(candidate) {
            Ok(value) => self.schema.check(&value),
            Err(e) => vec![FieldIssue::new("$", format!("not serializable: {e}"))],
        };
        merge_invariants(&mut issues, check_invariants(candidate));
        debug!(issues = issues.len(), "document validated");
        ValidationResult::from_issues(issues)
    }

    /// Structurally check an untyped payload, then convert and validate it.
    ///
    /// Payloads using the legacy `schedules` key are normalised first.
    pub fn parse(&self, raw: Value) -> Result<ScheduleDocument, ValidationReport> {
        let raw = normalize_legacy(raw);
        let issues = self.schema.check(&raw);
        if !issues.is_empty() {
            return Err(ValidationReport { issues });
        }
        let doc = wire::from_value(raw).map_err(|e| ValidationReport {
            issues: vec![FieldIssue::new("$", e.to_string())],
        })?;
        self.validate(&doc).into_result()?;
        Ok(doc)
    }

    /// Splice an untyped interval list into `current` under `device_id` and
    /// [`parse`](Self::parse) the result, so structural problems in the
    /// fragment carry paths like `$.devices.heater.intervals[0].start`.
    pub fn parse_partial(
        &self,
        current: &ScheduleDocument,
        device_id: &DeviceId,
        intervals: Value,
    ) -> Result<ScheduleDocument, ValidationReport> {
        let mut merged = wire::to_value(current).map_err(|e| ValidationReport {
            issues: vec![FieldIssue::new("$", format!("not serializable: {e}"))],
        })?;
        merged["devices"][device_id.as_str()] = serde_json::json!({ "intervals": intervals });
        self.parse(merged)
    }
}

fn normalize_legacy(raw: Value) -> Value {
    match raw {
        Value::Object(mut obj) if !obj.contains_key("devices") => {
            if let Some(devices) = obj.remove("schedules") {
                obj.insert("devices".to_string(), devices);
            }
            Value::Object(obj)
        }
        other => other,
    }
}

/// Add invariant issues whose path has not already been reported.
fn merge_invariants(issues: &mut Vec<FieldIssue>, extra: Vec<FieldIssue>) {
    for issue in extra {
        if !issues.iter().any(|i| i.path == issue.path) {
            issues.push(issue);
        }
    }
}

/// Model invariants that hold regardless of which schema is configured.
pub fn check_invariants(doc: &ScheduleDocument) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    for (id, schedule) in &doc.devices {
        let dpath = format!("$.devices.{id}");
        if !id.is_safe() {
            issues.push(FieldIssue::new(
                &dpath,
                "device id must match ^[a-z0-9][a-z0-9_]{0,63}$",
            ));
        }
        for (i, interval) in schedule.intervals.iter().enumerate() {
            let ipath = format!("{dpath}.intervals[{i}]");
            if interval.start >= interval.end {
                issues.push(FieldIssue::new(&ipath, "start must be before end"));
            }
            if interval.command.trim().is_empty() {
                issues.push(FieldIssue::new(
                    format!("{ipath}.command"),
                    "command must not be empty",
                ));
            }
            for (name, value) in [
                ("power_kw", interval.power_kw),
                ("energy_kwh", interval.energy_kwh),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v < 0.0 {
                        issues.push(FieldIssue::new(
                            format!("{ipath}.{name}"),
                            format!("{v} must be a finite number >= 0"),
                        ));
                    }
                }
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use aies_core::{DeviceSchedule, Interval};
    use chrono::{DateTime, FixedOffset};
    use serde_json::json;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn validator() -> Validator {
        Validator::builtin().unwrap()
    }

    fn heater(intervals: Vec<Interval>) -> ScheduleDocument {
        ScheduleDocument::from_devices([DeviceSchedule::new("heater", intervals)])
    }

    fn heat() -> Interval {
        Interval::new(
            ts("2025-06-02T00:00:00+02:00"),
            ts("2025-06-02T01:00:00+02:00"),
            "heat",
        )
        .with_power(2.5)
        .with_energy(1.1)
    }

    #[test]
    fn valid_document_passes() {
        assert_eq!(validator().validate(&heater(vec![heat()])), ValidationResult::Valid);
        assert!(validator().validate(&ScheduleDocument::empty()).is_valid());
    }

    #[test]
    fn start_after_end_is_rejected() {
        let mut bad = heat();
        std::mem::swap(&mut bad.start, &mut bad.end);
        let result = validator().validate(&heater(vec![heat(), bad]));
        assert!(!result.is_valid());
        assert_eq!(result.issues().len(), 1);
        assert_eq!(result.issues()[0].path, "$.devices.heater.intervals[1]");
    }

    #[test]
    fn zero_length_interval_is_rejected() {
        let mut bad = heat();
        bad.end = bad.start;
        assert!(!validator().validate(&heater(vec![bad])).is_valid());
    }

    #[test]
    fn negative_and_nan_figures_are_rejected() {
        let negative = heat().with_power(-0.5);
        let nan = heat().with_energy(f64::NAN);
        let result = validator().validate(&heater(vec![negative, nan]));
        let paths: Vec<&str> = result.issues().iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"$.devices.heater.intervals[0].power_kw"));
        assert!(paths.contains(&"$.devices.heater.intervals[1].energy_kwh"));
    }

    #[test]
    fn empty_command_reported_once() {
        let mut bad = heat();
        bad.command = String::new();
        let result = validator().validate(&heater(vec![bad]));
        // schema minLength and the invariant hit the same path
        assert_eq!(result.issues().len(), 1);
    }

    #[test]
    fn unsafe_device_id_is_rejected() {
        let doc = ScheduleDocument::from_devices([DeviceSchedule::new("../heater", vec![])]);
        let result = validator().validate(&doc);
        assert!(!result.is_valid());
        assert!(result.issues()[0].path.starts_with("$.devices."));
    }

    #[test]
    fn invariants_hold_under_permissive_schema() {
        let v = Validator::new(Schema::from_value(&json!(true)).unwrap());
        let mut bad = heat();
        std::mem::swap(&mut bad.start, &mut bad.end);
        assert!(!v.validate(&heater(vec![bad])).is_valid());
    }

    #[test]
    fn parse_accepts_legacy_payload() {
        let raw = json!({
            "schedules": { "heater": { "intervals": [{
                "start": "2025-06-02T00:00:00+02:00",
                "end": "2025-06-02T01:00:00+02:00",
                "command": "heat",
                "power_kw": 2.5,
                "energy_kwh": 1.1,
                "source": "ai"
            }]}}
        });
        let doc = validator().parse(raw).unwrap();
        assert_eq!(doc, heater(vec![heat()]));
    }

    #[test]
    fn parse_rejects_structural_errors_before_conversion() {
        let raw = json!({ "devices": { "heater": { "intervals": [{ "start": 5 }] } } });
        let report = validator().parse(raw).unwrap_err();
        assert!(report.issues.len() >= 3);
        assert!(report.to_string().contains("$.devices.heater.intervals[0].start"));
    }

    #[test]
    fn parse_runs_invariants() {
        let raw = json!({ "devices": { "heater": { "intervals": [{
            "start": "2025-06-02T02:00:00+02:00",
            "end": "2025-06-02T01:00:00+02:00",
            "command": "heat"
        }]}}});
        let report = validator().parse(raw).unwrap_err();
        assert_eq!(report.issues[0].reason, "start must be before end");
    }

    #[test]
    fn parse_partial_reports_fragment_paths() {
        let current = heater(vec![heat()]);
        let fragment = json!([{ "start": 5 }]);
        let report = validator()
            .parse_partial(&current, &DeviceId::from("heater"), fragment)
            .unwrap_err();
        assert!(report.to_string().contains("$.devices.heater.intervals[0].start"));
    }

    #[test]
    fn parse_partial_splices_intervals() {
        let current = ScheduleDocument::from_devices([
            DeviceSchedule::new("heater", vec![heat()]),
            DeviceSchedule::new("boiler", vec![heat()]),
        ]);
        let fragment = json!([{
            "start": "2025-06-02T03:00:00Z",
            "end": "2025-06-02T04:00:00Z",
            "command": "eco"
        }]);
        let doc = validator()
            .parse_partial(&current, &DeviceId::from("heater"), fragment)
            .unwrap();
        let heater = doc.device(&DeviceId::from("heater")).unwrap();
        assert_eq!(heater.intervals.len(), 1);
        assert_eq!(heater.intervals[0].command, "eco");
        assert_eq!(doc.device(&DeviceId::from("boiler")), current.device(&DeviceId::from("boiler")));
    }
}
