/// Predicate deciding whether a company number is a well-formed organisation number.
pub trait OrganisationNumberCheck: Send + Sync {
    fn is_valid(&self, code: &str) -> bool;
}

impl<F> OrganisationNumberCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_valid(&self, code: &str) -> bool {
        self(code)
    }
}

/// Swedish organisationsnummer: `NNNNNN-NNNN` or ten bare digits, third digit
/// at least 2, last digit a Luhn check digit over the first nine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwedishOrganisationNumber;

impl OrganisationNumberCheck for SwedishOrganisationNumber {
    fn is_valid(&self, code: &str) -> bool {
        let code = code.trim();
        let compact: String = match code.split_once('-') {
            Some((head, tail)) if head.len() == 6 && tail.len() == 4 => format!("{head}{tail}"),
            Some(_) => return false,
            None => code.to_string(),
        };

        let digits: Option<Vec<u32>> = compact.chars().map(|c| c.to_digit(10)).collect();
        let Some(digits) = digits else {
            return false;
        };

        digits.len() == 10 && digits[2] >= 2 && luhn_valid(&digits)
    }
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(index, digit)| {
            if index % 2 == 0 {
                let doubled = digit * 2;
                doubled / 10 + doubled % 10
            } else {
                *digit
            }
        })
        .sum();
    sum % 10 == 0
}
