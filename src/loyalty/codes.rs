use rand::Rng;

/// Scanner-friendly alphabet: no 0/O or 1/I look-alikes.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 8;

/// Source of fresh redeem code values. The ledger never generates
/// randomness itself; engines ask a generator and retry on collision.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
pub mod testing {
    use super::CodeGenerator;
    use std::sync::Mutex;

    /// Hands out `PREFIX1`, `PREFIX2`, ... in order, optionally replaying a
    /// fixed list of values first (used to force collisions).
    pub struct SequenceCodes {
        prefix: String,
        state: Mutex<(Vec<String>, u32)>,
    }

    impl SequenceCodes {
        pub fn new(prefix: &str) -> Self {
            Self::with_replay(prefix, &[])
        }

        pub fn with_replay(prefix: &str, replay: &[&str]) -> Self {
            let mut queued: Vec<String> = replay.iter().map(|s| s.to_string()).collect();
            queued.reverse();
            Self {
                prefix: prefix.to_string(),
                state: Mutex::new((queued, 0)),
            }
        }
    }

    impl CodeGenerator for SequenceCodes {
        fn generate(&self) -> String {
            let mut state = self.state.lock().unwrap();
            if let Some(next) = state.0.pop() {
                return next;
            }
            state.1 += 1;
            format!("{}{}", self.prefix, state.1)
        }
    }
}
