//! Schedule expressions accepted on a pipeline spec

const MACROS: [&str; 5] = ["@hourly", "@daily", "@weekly", "@monthly", "@yearly"];

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAYS: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct Field {
    min: u32,
    max: u32,
    names: &'static [&'static str],
}

const FIELDS: [Field; 5] = [
    Field { min: 0, max: 59, names: &[] },
    Field { min: 0, max: 23, names: &[] },
    Field { min: 1, max: 31, names: &[] },
    Field { min: 1, max: 12, names: &MONTHS },
    Field { min: 0, max: 7, names: &WEEKDAYS },
];

/// `manual`, an `@`-macro or a five-field cron expression
pub fn is_valid(schedule: &str) -> bool {
    let schedule = schedule.trim();
    if schedule.eq_ignore_ascii_case("manual") {
        return true;
    }
    if schedule.starts_with('@') {
        return MACROS.iter().any(|m| schedule.eq_ignore_ascii_case(m));
    }

    let parts: Vec<&str> = schedule.split_whitespace().collect();
    parts.len() == FIELDS.len()
        && parts
            .iter()
            .zip(FIELDS.iter())
            .all(|(part, field)| valid_field(part, field))
}

/// True when the schedule means the pipeline only runs on demand
pub fn is_manual(schedule: Option<&str>) -> bool {
    schedule.is_none_or(|s| s.trim().is_empty() || s.trim().eq_ignore_ascii_case("manual"))
}

fn valid_field(part: &str, field: &Field) -> bool {
    part.split(',').all(|item| {
        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step {
            if !matches!(step.parse::<u32>(), Ok(n) if n > 0) {
                return false;
            }
        }
        if base == "*" {
            return true;
        }
        match base.split_once('-') {
            Some((lo, hi)) => match (value(lo, field), value(hi, field)) {
                (Some(lo), Some(hi)) => lo <= hi,
                _ => false,
            },
            None => value(base, field).is_some(),
        }
    })
}

fn value(token: &str, field: &Field) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return (field.min..=field.max).contains(&n).then_some(n);
    }
    let lower = token.to_ascii_lowercase();
    field
        .names
        .iter()
        .position(|name| *name == lower)
        .map(|index| index as u32 + field.min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_known_forms() {
        for schedule in [
            "manual",
            "@daily",
            "@Hourly",
            "0 2 * * *",
            "*/15 * * * mon-fri",
            "0 0 1 jan,jul *",
            "5,35 8-18/2 * * 1",
        ] {
            assert!(is_valid(schedule), "{schedule}");
        }
    }

    #[test]
    fn test_rejects_bad_forms() {
        for schedule in [
            "",
            "daily",
            "@fortnightly",
            "0 2 * *",
            "60 * * * *",
            "* 24 * * *",
            "*/0 * * * *",
            "0 0 0 * *",
            "5-1 * * * *",
        ] {
            assert!(!is_valid(schedule), "{schedule}");
        }
    }

    #[test]
    fn test_is_manual() {
        assert!(is_manual(None));
        assert!(is_manual(Some("Manual")));
        assert!(!is_manual(Some("@daily")));
    }
}
