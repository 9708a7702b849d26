//! Presentation of a projection: annotated table rows, chart series, the
//! spreadsheet export and a CSV rendering for the command line.

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use serde::Serialize;
use thiserror::Error;

use crate::core::{LedgerRow, Projection};

pub const XLSX_FILE_NAME: &str = "margin_simulation.xlsx";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SHEET_NAME: &str = "Simulation";

const HEADER: [&str; 9] = [
    "Period",
    "Capital",
    "Margin Rate (%)",
    "Gross Margin",
    "Tax Rate (%)",
    "Net Margin",
    "Cumulative Net Margin",
    "Company Name",
    "Tax ID",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to write workbook: {0}")]
    Xlsx(#[from] XlsxError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyInfo {
    pub company_name: String,
    pub tax_id: String,
}

/// One table row. Rates are shown in percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub period: u32,
    pub capital: f64,
    pub margin_rate_pct: f64,
    pub gross_margin: f64,
    pub tax_rate_pct: f64,
    pub net_margin: f64,
    pub cumulative_net_margin: f64,
    pub company_name: String,
    pub tax_id: String,
}

impl ReportRow {
    fn from_ledger(row: &LedgerRow, company: &CompanyInfo) -> Self {
        Self {
            period: row.period,
            capital: row.capital,
            margin_rate_pct: row.margin_rate * 100.0,
            gross_margin: row.gross_margin,
            tax_rate_pct: row.tax_rate * 100.0,
            net_margin: row.net_margin,
            cumulative_net_margin: row.cumulative_net_margin,
            company_name: company.company_name.clone(),
            tax_id: company.tax_id.clone(),
        }
    }

    fn csv_record(&self) -> [String; 9] {
        [
            self.period.to_string(),
            self.capital.to_string(),
            self.margin_rate_pct.to_string(),
            self.gross_margin.to_string(),
            self.tax_rate_pct.to_string(),
            self.net_margin.to_string(),
            self.cumulative_net_margin.to_string(),
            self.company_name.clone(),
            self.tax_id.clone(),
        ]
    }
}

/// Line chart data: capital, net margin and cumulative net margin per period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub periods: Vec<u32>,
    pub capital: Vec<f64>,
    pub net_margin: Vec<f64>,
    pub cumulative_net_margin: Vec<f64>,
}

impl ChartSeries {
    pub fn from_ledger(rows: &[LedgerRow]) -> Self {
        let mut series = ChartSeries {
            periods: Vec::with_capacity(rows.len()),
            capital: Vec::with_capacity(rows.len()),
            net_margin: Vec::with_capacity(rows.len()),
            cumulative_net_margin: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            series.periods.push(row.period);
            series.capital.push(row.capital);
            series.net_margin.push(row.net_margin);
            series.cumulative_net_margin.push(row.cumulative_net_margin);
        }
        series
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub company_name: String,
    pub tax_id: String,
    pub period_count: u32,
    pub rows: Vec<ReportRow>,
    pub chart: ChartSeries,
}

impl SimulationReport {
    pub fn new(projection: &Projection, company: &CompanyInfo) -> Self {
        Self {
            company_name: company.company_name.clone(),
            tax_id: company.tax_id.clone(),
            period_count: projection.period_count,
            rows: projection
                .rows
                .iter()
                .map(|row| ReportRow::from_ledger(row, company))
                .collect(),
            chart: ChartSeries::from_ledger(&projection.rows),
        }
    }

    /// In-memory `.xlsx` workbook: a bold header row followed by one row per
    /// period. Amounts and rates are written as numbers.
    pub fn to_xlsx(&self) -> Result<Vec<u8>, ReportError> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;

        for (col, title) in (0u16..).zip(HEADER) {
            sheet.write_string_with_format(0, col, title, &bold)?;
        }
        for (row_num, row) in (1u32..).zip(&self.rows) {
            let numbers = [
                f64::from(row.period),
                row.capital,
                row.margin_rate_pct,
                row.gross_margin,
                row.tax_rate_pct,
                row.net_margin,
                row.cumulative_net_margin,
            ];
            for (col, value) in (0u16..).zip(numbers) {
                sheet.write_number(row_num, col, value)?;
            }
            sheet.write_string(row_num, 7, row.company_name.as_str())?;
            sheet.write_string(row_num, 8, row.tax_id.as_str())?;
        }

        Ok(workbook.save_to_buffer()?)
    }

    /// CSV text with the same columns as the workbook.
    pub fn to_csv(&self) -> Result<Vec<u8>, ReportError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(HEADER)?;
        for row in &self.rows {
            writer.write_record(row.csv_record())?;
        }
        writer.flush().map_err(csv::Error::from)?;
        writer
            .into_inner()
            .map_err(|e| ReportError::Csv(csv::Error::from(e.into_error())))
    }

    /// Fixed-width text table for terminal output.
    pub fn to_text_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:>6} {:>16} {:>9} {:>14} {:>9} {:>14} {:>16}\n",
            "Period", "Capital", "Margin %", "Gross", "Tax %", "Net", "Cumulative"
        ));
        for row in &self.rows {
            out.push_str(&format!(
                "{:>6} {:>16.2} {:>9.2} {:>14.2} {:>9.2} {:>14.2} {:>16.2}\n",
                row.period,
                row.capital,
                row.margin_rate_pct,
                row.gross_margin,
                row.tax_rate_pct,
                row.net_margin,
                row.cumulative_net_margin
            ));
        }
        out
    }
}
