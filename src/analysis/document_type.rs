use serde::Serialize;

/// The financial document categories with a dedicated extraction prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocumentType {
    #[serde(rename = "Bank Statement")]
    BankStatement,
    #[serde(rename = "Cheques")]
    Cheque,
    #[serde(rename = "Profit and Loss Statement")]
    ProfitAndLoss,
    #[serde(rename = "Salary Slip")]
    SalarySlip,
    #[serde(rename = "Transaction History")]
    TransactionHistory,
}

const REPLY_FORMAT: &str = "Reply only with CSV that has exactly two columns and the header \
line `Parameter,Value`, one row per parameter. Quote values that contain commas. Leave out \
parameters that do not appear in the document. If the image contains no text, reply \
\"No text found.\"";

impl DocumentType {
    pub const ALL: [DocumentType; 5] = [
        DocumentType::BankStatement,
        DocumentType::Cheque,
        DocumentType::ProfitAndLoss,
        DocumentType::SalarySlip,
        DocumentType::TransactionHistory,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::BankStatement => "Bank Statement",
            Self::Cheque => "Cheques",
            Self::ProfitAndLoss => "Profit and Loss Statement",
            Self::SalarySlip => "Salary Slip",
            Self::TransactionHistory => "Transaction History",
        }
    }

    /// Accepts the display label or a snake/kebab-case variant of it
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = normalize_label(s);
        let found = Self::ALL
            .into_iter()
            .find(|t| normalize_label(t.label()) == wanted);
        found.or(match wanted.as_str() {
            "cheque" | "check" | "checks" => Some(Self::Cheque),
            "pnl" | "p&l" | "profit and loss" => Some(Self::ProfitAndLoss),
            "payslip" | "salary slips" => Some(Self::SalarySlip),
            _ => None,
        })
    }

    /// `bank_statement`-style name used for download files
    pub fn file_stem(&self) -> String {
        self.label().to_lowercase().replace(' ', "_")
    }

    fn parameters(&self) -> &'static [&'static str] {
        match self {
            Self::BankStatement => &[
                "Bank Name",
                "Account Holder",
                "Account Number",
                "Statement Period",
                "Opening Balance",
                "Closing Balance",
                "Total Deposits",
                "Total Withdrawals",
            ],
            Self::Cheque => &[
                "Bank Name",
                "Cheque Number",
                "Date",
                "Payee",
                "Amount in Figures",
                "Amount in Words",
                "Account Number",
                "IFSC Code",
            ],
            Self::ProfitAndLoss => &[
                "Company Name",
                "Period",
                "Revenue",
                "Cost of Goods Sold",
                "Gross Profit",
                "Operating Expenses",
                "Operating Income",
                "Net Income",
            ],
            Self::SalarySlip => &[
                "Employee Name",
                "Employee ID",
                "Pay Period",
                "Basic Salary",
                "Allowances",
                "Gross Pay",
                "Deductions",
                "Net Pay",
            ],
            Self::TransactionHistory => &[
                "Account Number",
                "Period",
                "Number of Transactions",
                "Total Credits",
                "Total Debits",
                "Largest Transaction",
                "Opening Balance",
                "Closing Balance",
            ],
        }
    }

    /// Instruction sent with the document image
    pub fn prompt(&self) -> String {
        format!(
            "You are analyzing a {}. Extract the following parameters from the image: {}. \
             Copy each value exactly as printed, including currency symbols. {}",
            self.label().to_lowercase(),
            self.parameters().join(", "),
            REPLY_FORMAT
        )
    }
}

fn normalize_label(s: &str) -> String {
    s.trim().to_lowercase().replace(['_', '-'], " ")
}
