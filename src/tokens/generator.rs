use rand::Rng;

/// Generate an opaque token: `n` random bytes, hex encoded
pub fn generate_hex(n: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..n).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

/// Generate a 6-digit phone verification code
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex() {
        let token = generate_hex(32);
        assert_eq!(token.len(), 64); // 32 bytes * 2 hex chars

        // Ensure randomness
        let token2 = generate_hex(32);
        assert_ne!(token, token2);
    }

    #[test]
    fn test_generate_code() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
