//! Deterministic text templates for section records.
//!
//! Every section type has a templating function that turns a structured
//! record into a stable, keyword-enriched string. Identical input produces
//! byte-identical output; currency renders as `$12,345.67`, dates as
//! `YYYY-MM-DD`, and missing values as `Not specified`. A trailing
//! `Context keywords:` line per section improves recall. The retrieval layer
//! re-derives result content through these same functions, so any change here
//! is an index version change.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

/// Canonical placeholder for missing values.
pub const NOT_SPECIFIED: &str = "Not specified";

/// Field alias table: logical field to the names extractors actually emit,
/// in preference order.
fn field_aliases(field: &str) -> &'static [&'static str] {
    match field {
        "policy_number" => &["policy_number", "policy_no", "policy_id"],
        "named_insured" => &["named_insured", "insured_name", "insured"],
        "mailing_address" => &["mailing_address", "address"],
        "policy_period_start" => &["policy_period_start", "effective_date", "inception_date"],
        "policy_period_end" => &["policy_period_end", "expiration_date", "expiry_date"],
        "producer_name" => &["producer_name", "producer", "broker_name", "agent_name"],
        "premium_total" => &["premium_total", "total_premium", "premium_amount", "premium"],
        "limit_occurrence" => &["limit_occurrence", "per_occurrence_limit", "occurrence_limit", "limit_amount"],
        "limit_aggregate" => &["limit_aggregate", "aggregate_limit", "general_aggregate"],
        "deductible_amount" => &["deductible_amount", "deductible"],
        "location_id" => &["location_id", "loc_no", "location_number"],
        "vehicle_id" => &["vehicle_id", "unit_number"],
        "vin" => &["vin", "vehicle_identification_number"],
        "driver_id" => &["driver_id"],
        "license_number" => &["license_number", "license_no"],
        _ => &[],
    }
}

/// Semantic keywords appended per section type.
fn section_keywords(section_type: &str) -> &'static [&'static str] {
    match section_type {
        "declarations" => &["policy number", "named insured", "policy period", "premium", "producer", "declarations page"],
        "coverages" => &["coverage", "limit", "deductible", "per occurrence", "aggregate", "insuring agreement"],
        "exclusions" => &["exclusion", "excluded", "not covered", "limitation"],
        "conditions" => &["condition", "requirement", "duties", "obligation"],
        "endorsements" => &["endorsement", "amendment", "modification", "form number"],
        "premium_summary" => &["premium", "taxes", "commission", "payment plan"],
        "schedule_of_values" => &["location", "building value", "total insured value", "TIV", "construction", "occupancy"],
        "loss_run" => &["claim", "loss", "incurred", "paid", "reserves", "loss history"],
        "locations" => &["location", "address", "premises"],
        "notice_of_claim" => &["claim", "first notice of loss", "claimant", "date of loss"],
        "vehicle_schedule" => &["vehicle", "VIN", "make", "model", "garaging"],
        "driver_schedule" => &["driver", "license", "experience", "violations"],
        "definitions" => &["definition", "defined term", "meaning"],
        _ => &[],
    }
}

/// Aliases mapping loose section names onto template keys.
fn resolve_type_alias(normalized: &str) -> &str {
    match normalized {
        "sov" | "statement_of_values" => "schedule_of_values",
        "loss_runs" | "loss_history" => "loss_run",
        "declaration" | "dec_page" => "declarations",
        "coverage" => "coverages",
        "exclusion" => "exclusions",
        "condition" => "conditions",
        "endorsement" => "endorsements",
        "location" => "locations",
        "definition" => "definitions",
        "fnol" | "first_notice_of_loss" => "notice_of_claim",
        "premium" | "premiums" => "premium_summary",
        other => other,
    }
}

/// Look a field up through its aliases, skipping null-ish markers.
pub fn get_field<'a>(data: &'a JsonValue, field: &str) -> Option<&'a JsonValue> {
    let aliases: &[&str] = match field {
        "policy_number" | "named_insured" | "mailing_address" | "policy_period_start"
        | "policy_period_end" | "producer_name" | "premium_total" | "limit_occurrence"
        | "limit_aggregate" | "deductible_amount" | "location_id" | "vehicle_id" | "vin"
        | "driver_id" | "license_number" => field_aliases(field),
        _ => return data.get(field).filter(|v| is_present(v)),
    };
    aliases
        .iter()
        .find_map(|alias| data.get(*alias))
        .filter(|v| is_present(v))
}

fn is_present(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::String(s) => {
            let trimmed = s.trim();
            !trimmed.is_empty()
                && !matches!(trimmed, "N/A" | "null" | "None" | "nan")
        }
        _ => true,
    }
}

/// Render a currency amount canonically: `$12,345.67`. Unparseable input
/// passes through verbatim; null renders as `Not specified`.
pub fn format_currency(value: &JsonValue) -> String {
    let amount = match value {
        JsonValue::Null => return NOT_SPECIFIED.to_string(),
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    match amount {
        Some(amount) => {
            let negative = amount < 0.0;
            let cents = (amount.abs() * 100.0).round() as u64;
            let whole = cents / 100;
            let frac = cents % 100;
            let mut int_str = whole.to_string();
            let mut grouped = String::new();
            while int_str.len() > 3 {
                let split = int_str.len() - 3;
                grouped = format!(",{}{grouped}", &int_str[split..]);
                int_str.truncate(split);
            }
            let sign = if negative { "-" } else { "" };
            format!("{sign}${int_str}{grouped}.{frac:02}")
        }
        None => value_to_string(value),
    }
}

/// Render a date canonically as `YYYY-MM-DD`; unparseable input passes
/// through, null renders as `Not specified`.
pub fn format_date(value: &JsonValue) -> String {
    let Some(raw) = value.as_str() else {
        return if is_present(value) {
            value_to_string(value)
        } else {
            NOT_SPECIFIED.to_string()
        };
    };
    let date_part = raw.split('T').next().unwrap_or(raw);
    for pattern in ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, pattern) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_string()
}

fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_field(lines: &mut Vec<String>, label: &str, value: Option<&JsonValue>) {
    if let Some(value) = value {
        lines.push(format!("{label}: {}", value_to_string(value)));
    }
}

fn push_currency(lines: &mut Vec<String>, label: &str, value: Option<&JsonValue>) {
    if let Some(value) = value {
        lines.push(format!("{label}: {}", format_currency(value)));
    }
}

fn push_date(lines: &mut Vec<String>, label: &str, value: Option<&JsonValue>) {
    if let Some(value) = value {
        lines.push(format!("{label}: {}", format_date(value)));
    }
}

/// Render a structured record into its section's deterministic text,
/// including the trailing keyword line.
pub fn render(section_type: &str, data: &JsonValue) -> String {
    let normalized = section_type.to_lowercase().replace(' ', "_");
    let normalized = normalized.trim().to_string();
    let mapped = resolve_type_alias(&normalized);

    let base = match mapped {
        "declarations" => template_declarations(data),
        "coverages" => template_coverages(data),
        "exclusions" => template_exclusions(data),
        "endorsements" => template_endorsements(data),
        "premium_summary" => template_premium_summary(data),
        "conditions" => template_conditions(data),
        "schedule_of_values" => template_schedule_of_values(data),
        "loss_run" => template_loss_run(data),
        "locations" => template_locations(data),
        "notice_of_claim" => template_notice_of_claim(data),
        "vehicle_schedule" => template_vehicle_schedule(data),
        "driver_schedule" => template_driver_schedule(data),
        "definitions" => template_definitions(data),
        _ => template_default(&normalized, data),
    };

    let keywords = section_keywords(mapped);
    if keywords.is_empty() {
        base
    } else {
        format!("{base}\nContext keywords: {}", keywords.join(", "))
    }
}

fn template_declarations(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Declarations".to_string()];
    push_field(&mut lines, "Policy Number", get_field(data, "policy_number"));
    push_field(&mut lines, "Named Insured", get_field(data, "named_insured"));
    push_field(&mut lines, "Mailing Address", get_field(data, "mailing_address"));
    let start = get_field(data, "policy_period_start");
    let end = get_field(data, "policy_period_end");
    if start.is_some() || end.is_some() {
        lines.push(format!(
            "Policy Period: {} to {}",
            start.map(format_date).unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            end.map(format_date).unwrap_or_else(|| NOT_SPECIFIED.to_string()),
        ));
    }
    push_field(&mut lines, "Producer", get_field(data, "producer_name"));
    push_field(
        &mut lines,
        "Forms",
        data.get("form_numbers").or_else(|| data.get("forms")).filter(|v| is_present(v)),
    );
    push_currency(&mut lines, "Total Premium", get_field(data, "premium_total"));
    lines.join("\n")
}

fn template_coverages(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Coverage".to_string()];
    push_field(
        &mut lines,
        "Coverage Name",
        data.get("coverage_name").or_else(|| data.get("name")).filter(|v| is_present(v)),
    );
    let included = data.get("included").filter(|v| is_present(v));
    lines.push(format!(
        "Included: {}",
        included.map(value_to_string).unwrap_or_else(|| "Yes".to_string())
    ));
    push_currency(&mut lines, "Per Occurrence Limit", get_field(data, "limit_occurrence"));
    push_currency(&mut lines, "Aggregate Limit", get_field(data, "limit_aggregate"));
    if let Some(deductible) = get_field(data, "deductible_amount") {
        let ded_type = data
            .get("deductible_type")
            .and_then(JsonValue::as_str)
            .unwrap_or("");
        lines.push(format!(
            "Deductible: {} ({ded_type})",
            format_currency(deductible)
        ));
    }
    let sublimit_name = data.get("sublimit_name").filter(|v| is_present(v));
    let sublimit_amount = data.get("sublimit_amount").filter(|v| is_present(v));
    if sublimit_name.is_some() || sublimit_amount.is_some() {
        lines.push(format!(
            "Sublimit: {} {}",
            sublimit_name.map(value_to_string).unwrap_or_default(),
            sublimit_amount.map(format_currency).unwrap_or_default(),
        ));
    }
    lines.join("\n")
}

fn template_exclusions(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Exclusion".to_string()];
    push_field(
        &mut lines,
        "Exclusion Name",
        data.get("exclusion_name")
            .or_else(|| data.get("title"))
            .or_else(|| data.get("name"))
            .filter(|v| is_present(v)),
    );
    let manuscript = data.get("manuscript").filter(|v| is_present(v));
    lines.push(format!(
        "Manuscript: {}",
        manuscript.map(value_to_string).unwrap_or_else(|| "No".to_string())
    ));
    push_field(
        &mut lines,
        "Clause Summary",
        data.get("exclusion_clause").or_else(|| data.get("description")).filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Source Page",
        data.get("page_reference").or_else(|| data.get("source_page")).filter(|v| is_present(v)),
    );
    lines.join("\n")
}

fn template_endorsements(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Endorsement".to_string()];
    push_field(&mut lines, "Endorsement Number", data.get("endorsement_number").filter(|v| is_present(v)));
    push_field(
        &mut lines,
        "Title",
        data.get("endorsement_title").or_else(|| data.get("title")).filter(|v| is_present(v)),
    );
    push_date(
        &mut lines,
        "Effective Date",
        data.get("endorsement_date").or_else(|| data.get("effective_date")).filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Summary of Changes",
        data.get("changes_summary").or_else(|| data.get("summary")).filter(|v| is_present(v)),
    );
    lines.join("\n")
}

fn template_premium_summary(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Premium Summary".to_string()];
    push_currency(&mut lines, "Base Premium", data.get("base_premium").filter(|v| is_present(v)));
    push_currency(&mut lines, "Brokerage Commission", data.get("brokerage_commission").filter(|v| is_present(v)));
    push_currency(
        &mut lines,
        "Taxes and Fees",
        data.get("taxes_fees").or_else(|| data.get("tax_amount")).filter(|v| is_present(v)),
    );
    push_currency(&mut lines, "Total Premium", get_field(data, "premium_total"));
    push_field(&mut lines, "Payment Plan", data.get("payment_plan").filter(|v| is_present(v)));
    push_field(&mut lines, "Rate per 100", data.get("rate_per_100").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_conditions(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Condition".to_string()];
    push_field(
        &mut lines,
        "Condition Name",
        data.get("condition_name")
            .or_else(|| data.get("title"))
            .or_else(|| data.get("name"))
            .filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Clause Summary",
        data.get("condition_clause").or_else(|| data.get("description")).filter(|v| is_present(v)),
    );
    lines.join("\n")
}

fn template_schedule_of_values(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Schedule of Values".to_string()];
    push_field(&mut lines, "Location ID", get_field(data, "location_id"));
    push_field(
        &mut lines,
        "Address",
        data.get("full_address").or_else(|| data.get("address")).filter(|v| is_present(v)),
    );
    let lat = data.get("latitude").filter(|v| is_present(v));
    let lng = data.get("longitude").filter(|v| is_present(v));
    if let (Some(lat), Some(lng)) = (lat, lng) {
        lines.push(format!("Coordinates: {}, {}", value_to_string(lat), value_to_string(lng)));
    }
    push_currency(&mut lines, "Building Value", data.get("building_value").filter(|v| is_present(v)));
    push_currency(&mut lines, "Contents Value", data.get("contents_value").filter(|v| is_present(v)));
    push_currency(
        &mut lines,
        "Business Income Value",
        data.get("business_income").or_else(|| data.get("bi_value")).filter(|v| is_present(v)),
    );
    push_currency(
        &mut lines,
        "Total Insured Value",
        data.get("tiv").or_else(|| data.get("total_insured_value")).filter(|v| is_present(v)),
    );
    push_field(&mut lines, "Construction", data.get("construction_type").filter(|v| is_present(v)));
    push_field(
        &mut lines,
        "Occupancy",
        data.get("occupancy_class").or_else(|| data.get("occupancy")).filter(|v| is_present(v)),
    );
    push_field(&mut lines, "Year Built", data.get("year_built").filter(|v| is_present(v)));
    push_field(
        &mut lines,
        "Stories",
        data.get("stories").or_else(|| data.get("number_of_stories")).filter(|v| is_present(v)),
    );
    if let Some(area) = data.get("area_sqft").or_else(|| data.get("square_footage")).filter(|v| is_present(v)) {
        lines.push(format!("Area: {} sqft", value_to_string(area)));
    }
    push_field(&mut lines, "Protection Class", data.get("protection_class").filter(|v| is_present(v)));
    push_field(&mut lines, "Sprinklers", data.get("sprinklers").filter(|v| is_present(v)));
    push_field(&mut lines, "Alarms", data.get("alarms").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_loss_run(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Loss Run".to_string()];
    push_field(&mut lines, "Claim Number", data.get("claim_number").filter(|v| is_present(v)));
    push_field(&mut lines, "Policy Number", get_field(data, "policy_number"));
    push_date(&mut lines, "Date of Loss", data.get("date_of_loss").filter(|v| is_present(v)));
    push_field(&mut lines, "Cause of Loss", data.get("cause_of_loss").filter(|v| is_present(v)));
    push_field(
        &mut lines,
        "Status",
        data.get("status").or_else(|| data.get("claim_status")).filter(|v| is_present(v)),
    );
    push_currency(&mut lines, "Paid Indemnity", data.get("paid_indemnity").filter(|v| is_present(v)));
    push_currency(&mut lines, "Paid Expense", data.get("paid_expense").filter(|v| is_present(v)));
    push_currency(
        &mut lines,
        "Reserves",
        data.get("reserves").or_else(|| data.get("reserved_amount")).filter(|v| is_present(v)),
    );
    push_currency(&mut lines, "Total Incurred", data.get("incurred_total").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_locations(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Location".to_string()];
    push_field(
        &mut lines,
        "Location Number",
        data.get("location_number").or_else(|| data.get("loc_no")).filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Physical Address",
        data.get("physical_address").or_else(|| data.get("address")).filter(|v| is_present(v)),
    );
    push_field(&mut lines, "Mailing Address", data.get("mailing_address").filter(|v| is_present(v)));
    push_field(&mut lines, "Interest", data.get("interest").filter(|v| is_present(v)));
    push_field(&mut lines, "Year Built", data.get("year_built").filter(|v| is_present(v)));
    push_field(&mut lines, "Square Footage", data.get("square_footage").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_notice_of_claim(data: &JsonValue) -> String {
    let mut lines = vec!["Section: First Notice of Loss".to_string()];
    push_field(&mut lines, "Policy Number", get_field(data, "policy_number"));
    push_field(&mut lines, "Named Insured", get_field(data, "named_insured"));
    push_field(&mut lines, "Claimant", data.get("claimant_name").filter(|v| is_present(v)));
    let date = data.get("date_of_loss").filter(|v| is_present(v));
    let time = data.get("time_of_loss").filter(|v| is_present(v));
    if date.is_some() || time.is_some() {
        lines.push(format!(
            "Date of Loss: {} {}",
            date.map(format_date).unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            time.map(value_to_string).unwrap_or_default(),
        ));
    }
    push_field(&mut lines, "Loss Location", data.get("loss_location").filter(|v| is_present(v)));
    push_field(
        &mut lines,
        "Cause Description",
        data.get("cause_description").or_else(|| data.get("description")).filter(|v| is_present(v)),
    );
    push_currency(&mut lines, "Claimed Amount", data.get("claimed_amount").filter(|v| is_present(v)));
    push_field(&mut lines, "Police Report", data.get("police_report_number").filter(|v| is_present(v)));
    push_field(&mut lines, "Witnesses", data.get("witnesses").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_vehicle_schedule(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Vehicle Schedule".to_string()];
    push_field(&mut lines, "Vehicle ID", get_field(data, "vehicle_id"));
    push_field(&mut lines, "VIN", get_field(data, "vin"));
    push_field(&mut lines, "Year", data.get("year").filter(|v| is_present(v)));
    push_field(&mut lines, "Make", data.get("make").filter(|v| is_present(v)));
    push_field(&mut lines, "Model", data.get("model").filter(|v| is_present(v)));
    push_field(&mut lines, "Vehicle Type", data.get("vehicle_type").filter(|v| is_present(v)));
    push_field(&mut lines, "Garaging Address", data.get("garaging_address").filter(|v| is_present(v)));
    push_field(&mut lines, "Primary Use", data.get("primary_use").filter(|v| is_present(v)));
    push_field(&mut lines, "Operating Radius", data.get("radius_operation").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_driver_schedule(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Driver Schedule".to_string()];
    push_field(&mut lines, "Driver ID", get_field(data, "driver_id"));
    push_field(
        &mut lines,
        "Name",
        data.get("full_name").or_else(|| data.get("name")).filter(|v| is_present(v)),
    );
    push_date(&mut lines, "Date of Birth", data.get("date_of_birth").filter(|v| is_present(v)));
    if let Some(license) = get_field(data, "license_number") {
        let state = data
            .get("license_state")
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown State");
        lines.push(format!("License: {} ({state})", value_to_string(license)));
    }
    push_field(&mut lines, "Years of Experience", data.get("years_experience").filter(|v| is_present(v)));
    push_field(&mut lines, "Violations", data.get("violations_count").filter(|v| is_present(v)));
    push_field(&mut lines, "Accidents", data.get("accidents_count").filter(|v| is_present(v)));
    lines.join("\n")
}

fn template_definitions(data: &JsonValue) -> String {
    let mut lines = vec!["Section: Definitions".to_string()];
    push_field(
        &mut lines,
        "Term",
        data.get("term").or_else(|| data.get("defined_term")).filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Definition",
        data.get("definition")
            .or_else(|| data.get("meaning"))
            .or_else(|| data.get("description"))
            .filter(|v| is_present(v)),
    );
    push_field(
        &mut lines,
        "Context",
        data.get("context").or_else(|| data.get("applied_to")).filter(|v| is_present(v)),
    );
    lines.join("\n")
}

/// Default template for unmodeled sections. Identity-bearing fields sort to
/// the front; nested lists and empty values are skipped. Field order within
/// each group follows the record's (sorted) key order, keeping the output
/// byte-stable.
fn template_default(section_type: &str, data: &JsonValue) -> String {
    const IMPORTANT: [&str; 6] = ["id", "number", "name", "date", "amount", "value"];
    const SKIPPED_LISTS: [&str; 6] = [
        "entities",
        "coverages",
        "claims",
        "locations",
        "endorsements",
        "exclusions",
    ];

    let title = section_type
        .split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut important_lines = Vec::new();
    let mut other_lines = Vec::new();

    if let Some(obj) = data.as_object() {
        for (key, value) in obj {
            if SKIPPED_LISTS.contains(&key.as_str()) || !is_present(value) {
                continue;
            }
            let key_lower = key.to_lowercase();
            let field_name = key
                .split('_')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            let rendered = if key_lower.contains("amount") && value.is_number() {
                format_currency(value)
            } else if key_lower.contains("date") {
                format_date(value)
            } else {
                value_to_string(value)
            };
            let line = format!("{field_name}: {rendered}");
            if IMPORTANT.iter().any(|imp| key_lower.contains(imp)) {
                important_lines.push(line);
            } else {
                other_lines.push(line);
            }
        }
    }

    let mut lines = vec![format!("Document Section: {title}"), String::new()];
    lines.extend(important_lines);
    if !other_lines.is_empty() {
        lines.push(String::new());
        lines.extend(other_lines);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rendering_is_byte_stable() {
        let data = json!({
            "policy_number": "POL-8888",
            "named_insured": "Tech Solutions Inc.",
            "premium_total": 12345.67,
        });
        let a = render("declarations", &data);
        let b = render("declarations", &data);
        assert_eq!(a, b);
        assert!(a.contains("Policy Number: POL-8888"));
        assert!(a.contains("Total Premium: $12,345.67"));
        assert!(a.ends_with("Context keywords: policy number, named insured, policy period, premium, producer, declarations page"));
    }

    #[test]
    fn currency_formats_canonically() {
        assert_eq!(format_currency(&json!(12345.67)), "$12,345.67");
        assert_eq!(format_currency(&json!(5000000)), "$5,000,000.00");
        assert_eq!(format_currency(&json!("$1,250")), "$1,250.00");
        assert_eq!(format_currency(&json!(null)), "Not specified");
        assert_eq!(format_currency(&json!(0.5)), "$0.50");
    }

    #[test]
    fn dates_format_canonically() {
        assert_eq!(format_date(&json!("2024-05-01T00:00:00Z")), "2024-05-01");
        assert_eq!(format_date(&json!("05/01/2024")), "2024-05-01");
        assert_eq!(format_date(&json!(null)), "Not specified");
        assert_eq!(format_date(&json!("sometime")), "sometime");
    }

    #[test]
    fn policy_period_renders_missing_halves() {
        let data = json!({"policy_period_start": "2024-01-01"});
        let text = render("declarations", &data);
        assert!(text.contains("Policy Period: 2024-01-01 to Not specified"));
    }

    #[test]
    fn coverage_template_reads_aliases() {
        let data = json!({
            "coverage_name": "General Liability",
            "per_occurrence_limit": 1000000,
            "aggregate_limit": 2000000,
            "deductible": 5000,
            "deductible_type": "per claim",
        });
        let text = render("coverages", &data);
        assert!(text.contains("Coverage Name: General Liability"));
        assert!(text.contains("Per Occurrence Limit: $1,000,000.00"));
        assert!(text.contains("Aggregate Limit: $2,000,000.00"));
        assert!(text.contains("Deductible: $5,000.00 (per claim)"));
    }

    #[test]
    fn sov_alias_maps_to_schedule_of_values() {
        let data = json!({"address": "1 Main St", "tiv": 750000});
        let text = render("sov", &data);
        assert!(text.starts_with("Section: Schedule of Values"));
        assert!(text.contains("Total Insured Value: $750,000.00"));
    }

    #[test]
    fn null_markers_are_treated_as_missing() {
        let data = json!({"policy_number": "N/A", "named_insured": "Acme"});
        let text = render("declarations", &data);
        assert!(!text.contains("Policy Number"));
        assert!(text.contains("Named Insured: Acme"));
    }

    #[test]
    fn default_template_orders_important_fields_first() {
        let data = json!({
            "remarks": "open",
            "claim_number": "CLM-1",
            "entities": [{"type": "Claim"}],
        });
        let text = render("audit_notes", &data);
        let claim_pos = text.find("Claim Number: CLM-1").unwrap();
        let remarks_pos = text.find("Remarks: open").unwrap();
        assert!(claim_pos < remarks_pos);
        assert!(!text.contains("entities"));
    }

    #[test]
    fn definitions_template() {
        let data = json!({"term": "Business Income", "definition": "Net income plus continuing expenses"});
        let text = render("definitions", &data);
        assert!(text.contains("Term: Business Income"));
        assert!(text.contains("Definition: Net income plus continuing expenses"));
        assert!(text.contains("Context keywords: definition, defined term, meaning"));
    }
}
