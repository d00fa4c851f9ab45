use serde::Serialize;
use web3::contract::tokens::Detokenize;
use web3::contract::Error;
use web3::ethabi::Token;
use web3::types::{Address, H256, U256};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaffleStatus {
    Active,
    Ended,
    Unknown(u8),
}

impl From<u8> for RaffleStatus {
    fn from(v: u8) -> Self {
        match v {
            0 => RaffleStatus::Active,
            1 => RaffleStatus::Ended,
            other => RaffleStatus::Unknown(other),
        }
    }
}

impl From<U256> for RaffleStatus {
    /// Words past `u8::MAX` collapse to `Unknown(255)` rather than truncating.
    fn from(v: U256) -> Self {
        if v > U256::from(u8::MAX) {
            RaffleStatus::Unknown(u8::MAX)
        } else {
            RaffleStatus::from(v.low_u32() as u8)
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RaffleSummary {
    pub id: u64,
    pub title: String,
    pub creator: Address,
    pub ticket_price: U256,
    pub tickets_sold: u64,
    pub max_tickets: u64,
    pub expiration_time: u64,
    pub winner: Address,
    pub reward_claimed: bool,
    pub status: RaffleStatus,
    pub created_at: u64,
    /// Zero until the contract records a winner.
    pub winner_selected_at: u64,
}

impl RaffleSummary {
    pub fn has_winner(&self) -> bool {
        !self.winner.is_zero()
    }

    pub fn is_sold_out(&self) -> bool {
        self.tickets_sold >= self.max_tickets
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiration_time
    }

    /// Sold out or expired: ticket sales are over.
    pub fn is_closed(&self, now: u64) -> bool {
        self.is_sold_out() || self.is_expired(now)
    }

    /// Start of the distribution grace period.
    pub fn settled_at(&self) -> u64 {
        if self.winner_selected_at > 0 {
            self.winner_selected_at
        } else {
            self.created_at
        }
    }

    fn from_token(tokens: Vec<Token>) -> Result<Self, Error> {
        if tokens.len() != 12 {
            return Err(Error::InvalidOutputType(format!(
                "Expected 12 raffle fields, got a list of length {}: {:?}",
                tokens.len(),
                tokens
            )));
        }
        let mut it = tokens.into_iter();
        Ok(RaffleSummary {
            id: next_u64(&mut it, "id")?,
            title: next_token(&mut it, "title")?
                .into_string()
                .ok_or_else(|| field_err("title"))?,
            creator: next_address(&mut it, "creator")?,
            ticket_price: next_uint(&mut it, "ticketPrice")?,
            max_tickets: next_u64(&mut it, "maxTickets")?,
            tickets_sold: next_u64(&mut it, "ticketsSold")?,
            expiration_time: next_u64(&mut it, "expirationTime")?,
            winner: next_address(&mut it, "winner")?,
            reward_claimed: next_token(&mut it, "rewardClaimed")?
                .into_bool()
                .ok_or_else(|| field_err("rewardClaimed"))?,
            status: RaffleStatus::from(next_uint(&mut it, "status")?),
            created_at: next_u64(&mut it, "createdAt")?,
            winner_selected_at: next_u64(&mut it, "winnerSelectedAt")?,
        })
    }
}

impl Detokenize for RaffleSummary {
    fn from_tokens(tokens: Vec<Token>) -> Result<Self, Error> {
        RaffleSummary::from_token(unwrap_tuple(tokens))
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomnessCommitment {
    pub commitment: H256,
    pub commit_time: u64,
    pub revealed: bool,
    pub reveal_deadline: u64,
}

impl RandomnessCommitment {
    /// An all-zero commitment means nothing was committed.
    pub fn is_empty(&self) -> bool {
        self.commitment.is_zero()
    }

    pub fn is_ready_for_reveal(&self, now: u64) -> bool {
        !self.is_empty() && !self.revealed && self.reveal_deadline > 0 && now > self.reveal_deadline
    }
}

impl Detokenize for RandomnessCommitment {
    fn from_tokens(tokens: Vec<Token>) -> Result<Self, Error> {
        let tokens = unwrap_tuple(tokens);
        if tokens.len() != 4 {
            return Err(Error::InvalidOutputType(format!(
                "Expected 4 commitment fields, got a list of length {}: {:?}",
                tokens.len(),
                tokens
            )));
        }
        let mut it = tokens.into_iter();
        let commitment = match next_token(&mut it, "commitment")? {
            Token::FixedBytes(bytes) if bytes.len() == 32 => H256::from_slice(&bytes),
            _ => return Err(field_err("commitment")),
        };
        Ok(RandomnessCommitment {
            commitment,
            commit_time: next_u64(&mut it, "commitTime")?,
            revealed: next_token(&mut it, "revealed")?
                .into_bool()
                .ok_or_else(|| field_err("revealed"))?,
            reveal_deadline: next_u64(&mut it, "revealDeadline")?,
        })
    }
}

// Struct returns come back as one tuple token; flat multi-returns as a list.
fn unwrap_tuple(tokens: Vec<Token>) -> Vec<Token> {
    if tokens.len() == 1 {
        match tokens.into_iter().next() {
            Some(Token::Tuple(inner)) => inner,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    } else {
        tokens
    }
}

fn field_err(name: &str) -> Error {
    Error::InvalidOutputType(format!("unexpected token for field {}", name))
}

fn next_token(it: &mut impl Iterator<Item = Token>, name: &str) -> Result<Token, Error> {
    it.next().ok_or_else(|| field_err(name))
}

fn next_uint(it: &mut impl Iterator<Item = Token>, name: &str) -> Result<U256, Error> {
    next_token(it, name)?.into_uint().ok_or_else(|| field_err(name))
}

fn next_u64(it: &mut impl Iterator<Item = Token>, name: &str) -> Result<u64, Error> {
    let v = next_uint(it, name)?;
    if v > U256::from(u64::MAX) {
        return Err(field_err(name));
    }
    Ok(v.low_u64())
}

fn next_address(it: &mut impl Iterator<Item = Token>, name: &str) -> Result<Address, Error> {
    next_token(it, name)?.into_address().ok_or_else(|| field_err(name))
}
