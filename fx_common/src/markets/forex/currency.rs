//! Display metadata for currency codes. Unknown codes fall back to the code.

/// Full name of a currency (`USD` -> `US Dollar`).
pub fn currency_name(code: &str) -> &str {
    match code {
        "USD" => "US Dollar",
        "EUR" => "Euro",
        "JPY" => "Japanese Yen",
        "GBP" => "British Pound",
        "AUD" => "Australian Dollar",
        "CAD" => "Canadian Dollar",
        "CHF" => "Swiss Franc",
        "CNY" => "Chinese Yuan",
        "NZD" => "New Zealand Dollar",
        "SEK" => "Swedish Krona",
        "NOK" => "Norwegian Krone",
        "DKK" => "Danish Krone",
        "PLN" => "Polish Zloty",
        "CZK" => "Czech Koruna",
        "HUF" => "Hungarian Forint",
        "TRY" => "Turkish Lira",
        "ZAR" => "South African Rand",
        "MXN" => "Mexican Peso",
        "SGD" => "Singapore Dollar",
        "HKD" => "Hong Kong Dollar",
        other => other,
    }
}

/// Symbol of a currency (`GBP` -> `£`).
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "USD" | "MXN" => "$",
        "EUR" => "€",
        "JPY" | "CNY" => "¥",
        "GBP" => "£",
        "AUD" => "A$",
        "CAD" => "C$",
        "CHF" => "CHF",
        "NZD" => "NZ$",
        "SEK" | "NOK" | "DKK" => "kr",
        "PLN" => "zł",
        "CZK" => "Kč",
        "HUF" => "Ft",
        "TRY" => "₺",
        "ZAR" => "R",
        "SGD" => "S$",
        "HKD" => "HK$",
        other => other,
    }
}
