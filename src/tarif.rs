// Finance Suite - Tariff calculator
// IG Metall NRW 2025 pay table with the collectively agreed extras (T-ZUG A/B,
// Urlaubsgeld, Transformationsgeld, Weihnachtsgeld) and a per-month gross
// breakdown the grid consumes as income-row values.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// The collectively agreed 35-hour week all table figures refer to.
pub const STANDARD_HOURS: f64 = 35.0;

/// T-ZUG B is a fixed percentage of the EG 8 base figure for everyone.
const TZUG_B_REF: f64 = 3_196.00;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Monthly base salary for a pay group and tenure level (NRW 2025 table).
fn base_salary(group: &str, level: &str) -> Result<f64> {
    let table: &[(&str, f64)] = match group {
        "EG 1" => &[("Grundentgelt", 2_705.00)],
        "EG 2" => &[("Grundentgelt", 2_738.00)],
        "EG 3" => &[("Grundentgelt", 2_769.50)],
        "EG 4" => &[("Grundentgelt", 2_812.50)],
        "EG 5" => &[("Grundentgelt", 2_871.50)],
        "EG 6" => &[("Grundentgelt", 2_946.00)],
        "EG 7" => &[("Grundentgelt", 3_038.00)],
        "EG 8" => &[("Grundentgelt", 3_196.00)],
        "EG 9" => &[("Grundentgelt", 3_454.00)],
        "EG 10" => &[("Grundentgelt", 3_796.50)],
        "EG 11" => &[("Grundentgelt", 4_257.00)],
        "EG 12" => &[("bis 36. Monat", 4_387.00), ("nach 36. Monat", 4_872.00)],
        "EG 13" => &[
            ("bis 18. Monat", 4_902.00),
            ("nach 18. Monat", 5_190.50),
            ("nach 36. Monat", 5_766.50),
        ],
        "EG 14" => &[
            ("bis 12. Monat", 5_568.50),
            ("nach 12. Monat", 5_917.00),
            ("nach 24. Monat", 6_265.50),
            ("nach 36. Monat", 6_962.50),
        ],
        _ => bail!("unknown pay group: {group}"),
    };

    match table.iter().find(|(name, _)| *name == level) {
        Some((_, salary)) => Ok(*salary),
        None => bail!("level '{level}' not defined for {group}"),
    }
}

fn default_hours() -> f64 {
    STANDARD_HOURS
}
fn default_tzug_b_pct() -> f64 {
    18.5
}
fn default_urlaubsgeld_pct() -> f64 {
    72.0
}
fn default_transformationsgeld_pct() -> f64 {
    18.4
}
fn default_tzug_a_pct() -> f64 {
    27.5
}
fn default_weihnachtsgeld_base() -> f64 {
    25.0
}
fn default_weihnachtsgeld_max() -> f64 {
    55.0
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TarifInput {
    pub entgeltgruppe: String,
    pub stufe: String,
    #[serde(default = "default_hours")]
    pub wochenstunden: f64,
    #[serde(default)]
    pub leistungszulage_pct: f64,
    #[serde(default)]
    pub sonstige_zulage_pct: f64,
    #[serde(default = "default_tzug_b_pct")]
    pub tzug_b_pct: f64,
    #[serde(default = "default_urlaubsgeld_pct")]
    pub urlaubsgeld_pct: f64,
    #[serde(default = "default_transformationsgeld_pct")]
    pub transformationsgeld_pct: f64,
    #[serde(default = "default_tzug_a_pct")]
    pub tzug_a_pct: f64,
    #[serde(default = "default_weihnachtsgeld_base")]
    pub weihnachtsgeld_pct_base: f64,
    #[serde(default = "default_weihnachtsgeld_max")]
    pub weihnachtsgeld_pct_max: f64,
    #[serde(default)]
    pub betriebszugehoerigkeit_monate: u32,
    #[serde(default = "default_true")]
    pub include_transformationsgeld: bool,
}

impl TarifInput {
    pub fn new(entgeltgruppe: &str, stufe: &str) -> Self {
        Self {
            entgeltgruppe: entgeltgruppe.to_string(),
            stufe: stufe.to_string(),
            wochenstunden: STANDARD_HOURS,
            leistungszulage_pct: 0.0,
            sonstige_zulage_pct: 0.0,
            tzug_b_pct: default_tzug_b_pct(),
            urlaubsgeld_pct: default_urlaubsgeld_pct(),
            transformationsgeld_pct: default_transformationsgeld_pct(),
            tzug_a_pct: default_tzug_a_pct(),
            weihnachtsgeld_pct_base: default_weihnachtsgeld_base(),
            weihnachtsgeld_pct_max: default_weihnachtsgeld_max(),
            betriebszugehoerigkeit_monate: 0,
            include_transformationsgeld: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TarifResult {
    pub monatsgrund: f64,
    pub zulagen: f64,
    pub monatsgesamt: f64,
    pub tzug_b: f64,
    pub urlaubsgeld: f64,
    pub transformationsgeld: f64,
    pub tzug_a: f64,
    pub weihnachtsgeld: f64,
    pub jahresentgelt: f64,
}

/// One month of the gross breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBreakdown {
    pub monat: String,
    pub brutto: f64,
    pub bestandteile: String,
}

/// Annual pay estimate for the NRW 2025 metal and electrical industry tariff.
pub fn berechne_nrw_2025(input: &TarifInput) -> Result<TarifResult> {
    let base = base_salary(&input.entgeltgruppe, &input.stufe)?;

    let faktor = input.wochenstunden / STANDARD_HOURS;
    let grund_zeit = base * faktor;

    let lz = grund_zeit * input.leistungszulage_pct / 100.0;
    let sonst = grund_zeit * input.sonstige_zulage_pct / 100.0;
    let monatsgesamt = grund_zeit + lz + sonst;

    let tzug_b = TZUG_B_REF * input.tzug_b_pct / 100.0 * faktor;
    let urlaubsgeld = monatsgesamt * input.urlaubsgeld_pct / 100.0;
    let transformationsgeld = if input.include_transformationsgeld {
        monatsgesamt * input.transformationsgeld_pct / 100.0
    } else {
        0.0
    };
    let tzug_a = monatsgesamt * input.tzug_a_pct / 100.0;

    let wg_pct = if input.betriebszugehoerigkeit_monate >= 36 {
        input.weihnachtsgeld_pct_max
    } else {
        input.weihnachtsgeld_pct_base
    };
    let weihnachtsgeld = monatsgesamt * wg_pct / 100.0;

    let jahresentgelt = monatsgesamt * 12.0
        + tzug_b
        + urlaubsgeld
        + transformationsgeld
        + tzug_a
        + weihnachtsgeld;

    Ok(TarifResult {
        monatsgrund: round2(grund_zeit),
        zulagen: round2(lz + sonst),
        monatsgesamt: round2(monatsgesamt),
        tzug_b: round2(tzug_b),
        urlaubsgeld: round2(urlaubsgeld),
        transformationsgeld: round2(transformationsgeld),
        tzug_a: round2(tzug_a),
        weihnachtsgeld: round2(weihnachtsgeld),
        jahresentgelt: round2(jahresentgelt),
    })
}

/// Month-by-month gross figures: the one-off payments land in February
/// (T-ZUG B), June (Urlaubsgeld), July (T-ZUG A and Transformationsgeld) and
/// November (Weihnachtsgeld).
pub fn monthly_breakdown(input: &TarifInput) -> Result<Vec<MonthlyBreakdown>> {
    let res = berechne_nrw_2025(input)?;
    let base = res.monatsgesamt;

    let record = |monat: &str, brutto: f64, components: &[&str]| MonthlyBreakdown {
        monat: monat.to_string(),
        brutto: round2(brutto),
        bestandteile: components.join(", "),
    };

    let mut months = Vec::with_capacity(12);
    months.push(record("Januar", base, &["Grund-/Zulagen"]));
    months.push(record("Februar", base + res.tzug_b, &["Grund-/Zulagen", "T-ZUG B"]));
    months.push(record("März", base, &["Grund-/Zulagen"]));
    months.push(record("April", base, &["Grund-/Zulagen"]));
    months.push(record("Mai", base, &["Grund-/Zulagen"]));
    months.push(record("Juni", base + res.urlaubsgeld, &["Grund-/Zulagen", "Urlaubsgeld"]));

    let mut juli_comps = vec!["Grund-/Zulagen", "T-ZUG A"];
    if res.transformationsgeld > 0.0 {
        juli_comps.push("Transformationsgeld");
    }
    months.push(record(
        "Juli",
        base + res.tzug_a + res.transformationsgeld,
        &juli_comps,
    ));

    months.push(record("August", base, &["Grund-/Zulagen"]));
    months.push(record("September", base, &["Grund-/Zulagen"]));
    months.push(record("Oktober", base, &["Grund-/Zulagen"]));
    months.push(record(
        "November",
        base + res.weihnachtsgeld,
        &["Grund-/Zulagen", "Weihnachtsgeld"],
    ));
    months.push(record("Dezember", base, &["Grund-/Zulagen"]));

    Ok(months)
}
