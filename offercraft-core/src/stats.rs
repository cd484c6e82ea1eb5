//! Run statistics reported after processing an offer

use serde::Serialize;

/// Summary of one processing run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub modified_prices: usize,
    pub recalculated_subtotals: usize,
    pub formatted_units: usize,
    pub previous_label: String,
    pub new_label: String,
    /// Written grand total, absent when the sheet has no `TOTAL OFERTA` row
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<f64>,
}

impl RunStatistics {
    /// File name for the revised offer, e.g. `Oferta_Obra_Norte_R4.xlsx`
    pub fn output_file_name(&self) -> String {
        format!("Oferta_{}.xlsx", self.new_label.replace([' ', '/'], "_"))
    }

    /// Grand total in Spanish money format
    pub fn formatted_total(&self) -> Option<String> {
        self.grand_total.map(format_money)
    }
}

/// Format an amount as `1.234,56 €`
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{grouped},{frac_part} €")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_name() {
        let stats = RunStatistics {
            new_label: "Obra Norte 2024/25 R4".to_string(),
            ..Default::default()
        };
        assert_eq!(stats.output_file_name(), "Oferta_Obra_Norte_2024_25_R4.xlsx");
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "0,00 €");
        assert_eq!(format_money(30.5), "30,50 €");
        assert_eq!(format_money(999.999), "1.000,00 €");
        assert_eq!(format_money(1234.56), "1.234,56 €");
        assert_eq!(format_money(1234567.8), "1.234.567,80 €");
        assert_eq!(format_money(-1500.0), "-1.500,00 €");
    }

    #[test]
    fn test_grand_total_omitted_when_absent() {
        let stats = RunStatistics {
            previous_label: "Oferta".to_string(),
            new_label: "Oferta R1".to_string(),
            ..Default::default()
        };
        assert_eq!(stats.formatted_total(), None);

        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("grand_total").is_none());
        assert_eq!(json["new_label"], "Oferta R1");
    }
}
