//! Chain parameters: per-network fork activation heights and times,
//! proof-of-work limits, checkpoints, and subsidy schedule inputs.

use crate::pow::Uint256;
use crate::types::BlockHash;

/// The network a parameter set describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet3,
    Regtest,
}

/// A known-good block hash at a fixed height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: BlockHash,
}

/// Consensus parameters for one network.
///
/// Heights gate the height-based hard forks; unix timestamps gate the
/// MTP-based ones. A fork with threshold `F` is active for a candidate block
/// when the candidate's height exceeds `F` (equivalently, when its parent
/// has reached `F`).
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    pub genesis_hash: BlockHash,
    pub pow_limit: Uint256,

    pub subsidy_reduction_interval: u32,
    pub coinbase_maturity: u32,

    pub bip34_height: u32,
    pub bip65_height: u32,
    pub bip66_height: u32,
    /// Height at which the CSV deployment locked in.
    pub csv_height: u32,

    pub uahf_fork_height: u32,
    pub daa_fork_height: u32,
    pub magnetic_anomaly_fork_height: u32,
    pub great_wall_fork_height: u32,
    pub graviton_fork_height: u32,
    pub phonon_fork_height: u32,
    pub upgrade9_fork_height: u32,
    pub abla_fork_height: u32,

    /// MTP threshold for the CosmicInflation (May 2022) upgrade.
    pub cosmic_inflation_activation_time: i64,
    /// MTP threshold for the Upgrade11 (May 2025) upgrade.
    pub upgrade11_activation_time: i64,

    pub checkpoints: Vec<Checkpoint>,
}

fn pow_limit_bits_224() -> Uint256 {
    // 2^224 - 1
    let mut be = [0u8; 32];
    for byte in be.iter_mut().skip(4) {
        *byte = 0xff;
    }
    Uint256::from_be_bytes(be)
}

fn pow_limit_bits_255() -> Uint256 {
    // 2^255 - 1
    let mut be = [0xffu8; 32];
    be[0] = 0x7f;
    Uint256::from_be_bytes(be)
}

fn checkpoint(height: u32, hash: &str) -> Checkpoint {
    Checkpoint {
        height,
        hash: BlockHash::from_hex(hash).expect("static checkpoint hash"),
    }
}

impl ChainParams {
    /// Parameters for the main Bitcoin Cash network.
    pub fn mainnet() -> Self {
        ChainParams {
            network: Network::Mainnet,
            genesis_hash: BlockHash::from_hex(
                "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
            )
            .expect("static genesis hash"),
            pow_limit: pow_limit_bits_224(),
            subsidy_reduction_interval: 210_000,
            coinbase_maturity: 100,
            bip34_height: 227_931,
            bip65_height: 388_381,
            bip66_height: 363_725,
            csv_height: 419_328,
            uahf_fork_height: 478_558,
            daa_fork_height: 504_031,
            magnetic_anomaly_fork_height: 556_766,
            great_wall_fork_height: 582_679,
            graviton_fork_height: 609_135,
            phonon_fork_height: 635_258,
            upgrade9_fork_height: 792_772,
            abla_fork_height: 822_463,
            cosmic_inflation_activation_time: 1_652_616_000,
            upgrade11_activation_time: 1_747_310_400,
            checkpoints: vec![
                checkpoint(
                    11_111,
                    "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d",
                ),
                checkpoint(
                    134_444,
                    "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe",
                ),
                checkpoint(
                    295_000,
                    "00000000000000004d9b4ef50f0f9d686fd69db2e03af35a100370c64632a983",
                ),
                checkpoint(
                    478_558,
                    "0000000000000000011865af4122fe3b144e2cbeea86142e8ff2fb4107352d43",
                ),
                checkpoint(
                    556_767,
                    "0000000000000000004626ff6e3b936941d341c5932ece4357eeccac44e6d56c",
                ),
            ],
        }
    }

    /// Parameters for the testnet3 network.
    pub fn testnet3() -> Self {
        ChainParams {
            network: Network::Testnet3,
            genesis_hash: BlockHash::from_hex(
                "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
            )
            .expect("static genesis hash"),
            pow_limit: pow_limit_bits_224(),
            subsidy_reduction_interval: 210_000,
            coinbase_maturity: 100,
            bip34_height: 21_111,
            bip65_height: 581_885,
            bip66_height: 330_776,
            csv_height: 770_112,
            uahf_fork_height: 1_155_875,
            daa_fork_height: 1_188_697,
            magnetic_anomaly_fork_height: 1_267_996,
            great_wall_fork_height: 1_303_884,
            graviton_fork_height: 1_341_711,
            phonon_fork_height: 1_378_460,
            upgrade9_fork_height: 1_552_787,
            abla_fork_height: 1_605_520,
            cosmic_inflation_activation_time: 1_652_616_000,
            upgrade11_activation_time: 1_747_310_400,
            checkpoints: vec![checkpoint(
                546,
                "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
            )],
        }
    }

    /// Parameters for local regression testing. Every hard fork is active
    /// from the first block and there are no checkpoints.
    pub fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            genesis_hash: BlockHash::from_hex(
                "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
            )
            .expect("static genesis hash"),
            pow_limit: pow_limit_bits_255(),
            subsidy_reduction_interval: 150,
            coinbase_maturity: 100,
            bip34_height: 100_000_000,
            bip65_height: 1_351,
            bip66_height: 1_251,
            csv_height: 0,
            uahf_fork_height: 0,
            daa_fork_height: 0,
            magnetic_anomaly_fork_height: 0,
            great_wall_fork_height: 0,
            graviton_fork_height: 0,
            phonon_fork_height: 0,
            upgrade9_fork_height: 0,
            abla_fork_height: 0,
            cosmic_inflation_activation_time: 0,
            upgrade11_activation_time: 0,
            checkpoints: vec![],
        }
    }

    /// The checkpoint at the given height, if one exists.
    pub fn checkpoint_at(&self, height: u32) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.height == height)
    }

    /// The most recent checkpoint, if any are configured.
    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().max_by_key(|cp| cp.height)
    }
}
