//! Persisted-query catalogue
//!
//! SplatNet only accepts queries it has seen before, identified by the
//! SHA-256 of the query text. The request body carries the hash and the
//! variables, never the query itself.

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

pub const HOME: &str = "HomeQuery";
pub const LATEST_BATTLES: &str = "LatestBattleHistoriesQuery";
pub const REGULAR_BATTLES: &str = "RegularBattleHistoriesQuery";
pub const BANKARA_BATTLES: &str = "BankaraBattleHistoriesQuery";
pub const PRIVATE_BATTLES: &str = "PrivateBattleHistoriesQuery";
pub const X_BATTLES: &str = "XBattleHistoriesQuery";
pub const EVENT_BATTLES: &str = "EventBattleHistoriesQuery";
pub const BATTLE_DETAIL: &str = "VsHistoryDetailQuery";
pub const LATEST_BATTLE: &str = "PagerLatestVsDetailQuery";
pub const COOPS: &str = "CoopHistoryQuery";
pub const COOP_DETAIL: &str = "CoopHistoryDetailQuery";
pub const FRIENDS: &str = "FriendListQuery";
pub const HISTORY_RECORD: &str = "HistoryRecordQuery";
pub const TOTAL: &str = "TotalQuery";
pub const X_RANKING: &str = "XRankingQuery";
pub const X_RANKING_500: &str = "XRanking500Query";
pub const SCHEDULES: &str = "StageScheduleQuery";
pub const STAGE_RECORDS: &str = "StageRecordQuery";
pub const WEAPON_RECORDS: &str = "WeaponRecordQuery";
pub const EVENT_LIST: &str = "EventListQuery";
pub const EVENT_BOARD: &str = "EventBoardQuery";
pub const CATALOG: &str = "CatalogQuery";

const QUERIES: &[(&str, &str)] = &[
    (HOME, "51fc56bbf006caf37728914aa8bc0e2c86a80cf195b4d4027d6822a3623098a8"),
    (LATEST_BATTLES, "b24d22fd6cb251c515c2b90044039698aa27bc1fab15801d83014d919cd45780"),
    (REGULAR_BATTLES, "2fe6ea7a2de1d6a888b7bd3dbeb6acc8e3246f055ca39b80c4531bbcd0727bba"),
    (BANKARA_BATTLES, "9863ea4744730743268e2940396e21b891104ed40e2286789f05100b45a0b0fd"),
    (PRIVATE_BATTLES, "fef94f39b9eeac6b2fac4de43bc0442c16a9f2df95f4d367dd8a79d7c5ed5ce7"),
    (X_BATTLES, "eb5996a12705c2e94813a62e05c0dc419aad2811b8d49d53e5732290105559cb"),
    (BATTLE_DETAIL, "94faa2ff992222d11ced55e0f349920a82ac50f414ae33c83d1d1c9d8161c5dd"),
    (EVENT_BATTLES, "e47f9aac5599f75c842335ef0ab8f4c640e8bf2afe588a3b1d4b480ee79198ac"),
    (COOPS, "e11a8cf2c3de7348495dea5cdcaa25e0c153541c4ed63f044b6c174bc5b703df"),
    (COOP_DETAIL, "f2d55873a9281213ae27edc171e2b19131b3021a2ae263757543cdd3bf015cc8"),
    (LATEST_BATTLE, "73462e18d464acfdf7ac36bde08a1859aa2872a90ed0baed69c94864c20de046"),
    (FRIENDS, "ea1297e9bb8e52404f52d89ac821e1d73b726ceef2fd9cc8d6b38ab253428fb3"),
    (HISTORY_RECORD, "a654ecc80161a7ca5c38761c1d9e502d405eae764e2d343618b9c74b1dc0a80f"),
    (TOTAL, "2a9302bdd09a13f8b344642d4ed483b9464f20889ac17401e993dfa5c2bb3607"),
    (X_RANKING, "a5331ed228dbf2e904168efe166964e2be2b00460c578eee49fc0bc58b4b899c"),
    (X_RANKING_500, "90932ee3357eadab30eb11e9d6b4fe52d6b35fde91b5c6fd92ba4d6159ea1cb7"),
    (SCHEDULES, "9b6b90568f990b2a14f04c25dd6eb53b35cc12ac815db85ececfccee64215edd"),
    (STAGE_RECORDS, "c8b31c491355b4d889306a22bd9003ac68f8ce31b2d5345017cdd30a2c8056f3"),
    (WEAPON_RECORDS, "6b8db227bbe479401875e509a95c3183931e708ec222a824f8d4157cebea4584"),
    (EVENT_LIST, "bf5cefda9fb6a7511fe4620a0be0c7492ca56ae10f41790cf490bbe8904fefea"),
    (EVENT_BOARD, "ad4097d5fb900b01f12dffcb02228ef6c20ddbfba41f0158bb91e845335c708e"),
    (CATALOG, "52c4b6a69b45e9f2c51f5efc6c7c3679bafb8e7d0ff8f31ce53a68b9bd945f9f"),
];

/// Hash registered for `operation`, if it is a known query.
pub fn query_hash(operation: &str) -> Option<&'static str> {
    QUERIES
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, hash)| *hash)
}

/// Names of every known query.
pub fn operations() -> impl Iterator<Item = &'static str> {
    QUERIES.iter().map(|(name, _)| *name)
}

/// Request body for a persisted query.
pub fn request_body(operation: &str, variables: Map<String, Value>) -> Result<Value> {
    let hash = query_hash(operation).ok_or_else(|| Error::UnknownQuery(operation.to_string()))?;
    Ok(json!({
        "extensions": {
            "persistedQuery": {
                "sha256Hash": hash,
                "version": 1,
            }
        },
        "variables": variables,
    }))
}

/// Variables map with a single entry.
pub fn variable(name: &str, value: impl Into<Value>) -> Map<String, Value> {
    let mut variables = Map::new();
    variables.insert(name.to_string(), value.into());
    variables
}
