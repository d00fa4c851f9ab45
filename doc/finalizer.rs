//=====================================================================================================================

Finalizer:

The finalizer service (off-chain) drives raffles on the RaffleV4 contract through commit-reveal.

// Read
- function getActiveRaffleIds() external view returns (uint256[] memory)
- function getRaffleDetails(uint256 raffleId) external view returns (RaffleDetails memory)
- function getRandomnessCommitment(uint256 raffleId) external view returns (RandomnessCommitment memory)
- function getTotalRaffleCount() external view returns (uint256)

// Commit phase: lock a hidden nonce once ticket sales are over
- function commitRandomness(uint256 raffleId, bytes32 commitment) external
    - commitment = keccak256(bytes(decimal string of nonce))

// Reveal phase: select the winner
- function revealAndSelectWinner(uint256 raffleId, uint256 nonce) external
- function emergencySelectWinner(uint256 raffleId) external      (no nonce available)

// Payout
- function distributeReward(uint256 raffleId) external


//=====================================================================================================================

Environment:

    PRIVATE_KEY         operating account, signs every transaction (required)
    RAFFLE_CONTRACT     RaffleV4 address (required)
    RPC_URL             default http://localhost:8545
    CHAIN_ID            checked against the node at startup when set
    CHAIN_NAME          shown in the startup line
    RPC_TIMEOUT_SECS    per request, default 30
    MIN_GAS_RESERVE     native units, default 0.01
    NONCE_STORE_URL     redis://... keeps nonces across restarts; in memory when unset
    RUST_LOG            default info

    raffle-finalizer --once            one cycle, exit 0
    raffle-finalizer --interval 5      cycle now, then every 5 minutes


//=====================================================================================================================

Cycle:

    1> Skip the cycle if another one is still running.

    2> Read the operating balance; skip the cycle below MIN_GAS_RESERVE.

    3> Scan up to 50 active raffles (list order).
        - No winner, sold out or expired, empty commitment    => commit
        - No winner, commitment past revealDeadline           => reveal
        - No winner, sold out or expired, commitment unreadable => stored nonce if any, else emergency selection
        - Unknown status or unreadable details                => skip, log

    4> Commit, one raffle at a time.
        - nonce in [0, 1e9), stored before the transaction is sent
        - gas = estimate * 120%, wait one confirmation, then 2s
        - "already committed" from the contract is a warning, the nonce is dropped

    5> Reveal, one raffle at a time.
        - stored nonce => revealAndSelectWinner, otherwise emergencySelectWinner
        - the nonce is dropped after the attempt
        - only a confirmed selection marks the raffle processed for this session
        - winner logged from the WinnerSelected event when it decodes

    6> Distribute over the last 100 raffle ids.
        - winner set, reward unclaimed, status Ended, 60s since winnerSelectedAt
          (createdAt when the contract reports 0)
        - gas = estimate * 120%, wait one confirmation, then 2s

    7> Trim the processed set to the 1000 highest ids, log the cycle report.

SIGINT / SIGTERM exit at once; an in-flight cycle is abandoned.
