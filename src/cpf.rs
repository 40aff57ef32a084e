//! CPF, the Brazilian national identifier of individuals.

pub const LENGTH: usize = 11;

/// Keeps only the digits, so `529.982.247-25` becomes `52998224725`.
pub fn normalize(cpf: &str) -> String {
    digits(cpf)
}

pub fn is_complete(cpf: &str) -> bool {
    normalize(cpf).len() == LENGTH
}

/// Strips everything but ASCII digits. Used for phones, postal codes and the
/// voter title as well.
pub fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}
