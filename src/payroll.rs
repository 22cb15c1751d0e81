// Finance Suite - Payroll calculator
// German gross-to-net estimation for 2025. Pure request/response service: the
// grid core only consumes its output as monthly values for the income row.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ---------------- constants (2025 figures) ----------------

const BASIC_ALLOWANCE: f64 = 12_096.0;
const ZONE1_END: f64 = 17_443.0;
const ZONE2_END: f64 = 68_480.0;
const ZONE3_END: f64 = 277_825.0;

const SOLI_FREE_SINGLE: f64 = 19_950.0;
const SOLI_FREE_MARRIED: f64 = 39_900.0;
const SOLI_RATE: f64 = 0.055;

const KV_GENERAL: f64 = 0.146;
pub const KV_AVG_ADD: f64 = 0.025;
const PV_BASE: f64 = 0.036;
const PV_CHILDLESS_SURCH: f64 = 0.006;
const RV_RATE: f64 = 0.186;
const AV_RATE: f64 = 0.026;

// contribution ceilings (monthly)
const BBG_KV_PV: f64 = 5_512.50;
const BBG_RV_AV: f64 = 8_050.00;

const WK_PAUSCHALE: f64 = 1_230.0;
const SONDERAUSG_PAUS: f64 = 36.0;
const VSP_MAX_RATE: f64 = 0.20;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Church tax rate by federal state (Bavaria and Baden-Wuerttemberg 9%, the
/// rest 8%).
fn church_tax_rate(state: &str) -> Result<f64> {
    match state {
        "BY" | "BW" => Ok(0.09),
        "NW" | "NI" | "HB" | "HH" | "HE" | "RP" | "SL" | "SH" | "MV" | "SN" | "ST" | "BB"
        | "BE" | "TH" => Ok(0.08),
        _ => bail!("unknown federal state: {state}"),
    }
}

/// 2025 income tax tariff (§32a EStG zone formulas).
pub fn income_tax(zve: f64) -> f64 {
    if zve <= BASIC_ALLOWANCE {
        return 0.0;
    }
    if zve <= ZONE1_END {
        let y = (zve - BASIC_ALLOWANCE) / 10_000.0;
        return (932.3 * y + 1_400.0) * y;
    }
    if zve <= ZONE2_END {
        let z = (zve - ZONE1_END) / 10_000.0;
        return (176.64 * z + 2_397.0) * z + 1_015.13;
    }
    if zve <= ZONE3_END {
        return 0.42 * zve - 10_911.92;
    }
    0.45 * zve - 19_246.67
}

/// Solidarity surcharge with the sliding zone above the exemption threshold.
pub fn soli(tax: f64, married: bool) -> f64 {
    let free = if married {
        SOLI_FREE_MARRIED
    } else {
        SOLI_FREE_SINGLE
    };
    if tax <= free {
        return 0.0;
    }
    let diff = tax - free;
    if diff < 1_000.0 {
        (0.19945 * diff).min(SOLI_RATE * tax)
    } else {
        SOLI_RATE * tax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Monthly,
    Yearly,
}

fn default_period() -> Period {
    Period::Monthly
}
fn default_tax_class() -> u8 {
    1
}
fn default_state() -> String {
    "NW".to_string()
}
fn default_true() -> bool {
    true
}
fn default_kv_add() -> f64 {
    KV_AVG_ADD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollInput {
    pub gross: f64,
    #[serde(default = "default_period")]
    pub period: Period,
    #[serde(default = "default_tax_class")]
    pub tax_class: u8,
    #[serde(default)]
    pub married: bool,
    #[serde(default = "default_state")]
    pub federal_state: String,
    #[serde(default)]
    pub church: bool,
    #[serde(default = "default_true")]
    pub childless: bool,
    #[serde(default = "default_kv_add")]
    pub additional_kv: f64,
}

impl PayrollInput {
    pub fn monthly(gross: f64) -> Self {
        Self {
            gross,
            period: Period::Monthly,
            tax_class: 1,
            married: false,
            federal_state: "NW".to_string(),
            church: false,
            childless: true,
            additional_kv: KV_AVG_ADD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollResult {
    pub net: f64,
    pub income_tax: f64,
    pub solidarity: f64,
    pub church_tax: f64,
    pub health_employee: f64,
    pub health_employer: f64,
    pub care_employee: f64,
    pub care_employer: f64,
    pub pension_employee: f64,
    pub pension_employer: f64,
    pub unemployment_employee: f64,
    pub unemployment_employer: f64,
}

/// Estimate net pay from gross pay.
pub fn gross_to_net(input: &PayrollInput) -> Result<PayrollResult> {
    if !input.gross.is_finite() || input.gross < 0.0 {
        bail!("gross must be a non-negative number");
    }

    let m_gross = match input.period {
        Period::Monthly => input.gross,
        Period::Yearly => input.gross / 12.0,
    };
    let a_gross = m_gross * 12.0;

    // social insurance, employee and employer halves
    let kv_rate = KV_GENERAL + input.additional_kv;
    let kv_emp = m_gross.min(BBG_KV_PV) * kv_rate / 2.0;
    let kv_ag = kv_emp;

    let pv_ag = m_gross.min(BBG_KV_PV) * PV_BASE / 2.0;
    let mut pv_emp = pv_ag;
    if input.childless {
        // childless surcharge is employee-only, capped at the same ceiling
        pv_emp += m_gross.min(BBG_KV_PV) * PV_CHILDLESS_SURCH;
    }

    let rv_emp = m_gross.min(BBG_RV_AV) * RV_RATE / 2.0;
    let rv_ag = rv_emp;
    let av_emp = m_gross.min(BBG_RV_AV) * AV_RATE / 2.0;
    let av_ag = av_emp;

    let sv_emp_annual = 12.0 * (kv_emp + pv_emp + rv_emp + av_emp);
    let vsp = sv_emp_annual.min(VSP_MAX_RATE * a_gross);

    // taxable income and tariff
    let zve = a_gross - vsp - WK_PAUSCHALE - SONDERAUSG_PAUS;
    let mut tax_y = income_tax(zve.max(0.0));
    match input.tax_class {
        3 => tax_y = 2.0 * income_tax(zve / 2.0),
        5 => tax_y *= 1.20,
        6 => tax_y *= 1.30,
        _ => {}
    }

    let tax_m = tax_y / 12.0;
    let soli_m = soli(tax_y, input.married) / 12.0;
    let kist_m = if input.church {
        tax_m * church_tax_rate(&input.federal_state)?
    } else {
        0.0
    };

    let deductions = tax_m + soli_m + kist_m + kv_emp + pv_emp + rv_emp + av_emp;
    let net_m = m_gross - deductions;
    let net = match input.period {
        Period::Monthly => net_m,
        Period::Yearly => net_m * 12.0,
    };

    let yearly = input.period == Period::Yearly;
    Ok(PayrollResult {
        net: round2(net),
        income_tax: round2(if yearly { tax_y } else { tax_m }),
        solidarity: round2(if yearly { soli_m * 12.0 } else { soli_m }),
        church_tax: round2(if yearly { kist_m * 12.0 } else { kist_m }),
        health_employee: round2(kv_emp),
        health_employer: round2(kv_ag),
        care_employee: round2(pv_emp),
        care_employer: round2(pv_ag),
        pension_employee: round2(rv_emp),
        pension_employer: round2(rv_ag),
        unemployment_employee: round2(av_emp),
        unemployment_employer: round2(av_ag),
    })
}

/// Find the gross pay whose net is closest to `target_net` by bisection.
pub fn net_to_gross(target_net: f64, template: &PayrollInput) -> Result<(f64, PayrollResult)> {
    let mut lo = 0.0;
    let mut hi = target_net * 3.0;
    let mut result = None;

    for _ in 0..25 {
        let mid = (lo + hi) / 2.0;
        let mut input = template.clone();
        input.gross = mid;
        let res = gross_to_net(&input)?;
        if res.net > target_net {
            hi = mid;
        } else {
            lo = mid;
        }
        result = Some(res);
    }

    // result is always Some after 25 iterations
    Ok((round2(hi), result.expect("bisection ran")))
}
