//! Sponsor forest: one upward sponsor pointer per account, a
//! downward child list, and the referral-code index.
//!
//! The structure is a forest by construction — an account is linked
//! exactly once, at enrollment, before it can sponsor anyone — so
//! traversals need no cycle detection.

use std::collections::BTreeMap;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::ledger::AccountId;

const CODE_LEN: usize = 8;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReferralForest {
    sponsors: BTreeMap<AccountId, AccountId>,
    children: BTreeMap<AccountId, Vec<AccountId>>,
    codes: BTreeMap<String, AccountId>,
    code_of: BTreeMap<AccountId, String>,
}

impl ReferralForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enroll an account, optionally under a sponsor's referral code,
    /// and hand back its freshly generated unique code. Root accounts
    /// (no sponsor) start new trees in the forest.
    pub fn enroll(
        &mut self,
        account: &AccountId,
        sponsor_code: Option<&str>,
    ) -> CoreResult<String> {
        if self.code_of.contains_key(account) {
            return Err(CoreError::DuplicateAccount(account.clone()));
        }
        let sponsor = match sponsor_code {
            Some(code) => Some(
                self.codes
                    .get(code)
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownReferralCode(code.to_string()))?,
            ),
            None => None,
        };
        let code = self.generate_code(account);
        if let Some(sponsor) = sponsor {
            self.sponsors.insert(account.clone(), sponsor.clone());
            self.children.entry(sponsor).or_default().push(account.clone());
        }
        self.codes.insert(code.clone(), account.clone());
        self.code_of.insert(account.clone(), code.clone());
        Ok(code)
    }

    fn generate_code(&self, account: &AccountId) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let mut salt = [0u8; 8];
            rng.fill_bytes(&mut salt);
            let mut hasher = Sha256::new();
            hasher.update(b"refcode");
            hasher.update(account.as_bytes());
            hasher.update(salt);
            let digest = hasher.finalize();
            let code = hex::encode(&digest[..CODE_LEN / 2]).to_uppercase();
            if !self.codes.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn code_of(&self, account: &AccountId) -> Option<&str> {
        self.code_of.get(account).map(String::as_str)
    }

    pub fn resolve_code(&self, code: &str) -> Option<&AccountId> {
        self.codes.get(code)
    }

    pub fn sponsor_of(&self, account: &AccountId) -> Option<&AccountId> {
        self.sponsors.get(account)
    }

    pub fn downline(&self, account: &AccountId) -> &[AccountId] {
        self.children.get(account).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Lazy walk over ancestors, nearest first, stopping at the root
    /// or after `max_depth` steps.
    pub fn sponsor_chain<'a>(
        &'a self,
        account: &AccountId,
        max_depth: usize,
    ) -> SponsorChain<'a> {
        SponsorChain {
            forest: self,
            cursor: account.clone(),
            remaining: max_depth,
        }
    }

    /// Downward traversal for team statistics: members per level,
    /// level 1 being the direct downline.
    pub fn subtree(&self, account: &AccountId, max_depth: usize) -> Vec<TeamLevel> {
        let mut levels = Vec::new();
        let mut frontier: Vec<&AccountId> = vec![account];
        for depth in 1..=max_depth {
            let mut next = Vec::new();
            for member in &frontier {
                next.extend(self.downline(member).iter());
            }
            if next.is_empty() {
                break;
            }
            levels.push(TeamLevel {
                level: depth as u32,
                members: next.iter().map(|a| (*a).clone()).collect(),
            });
            frontier = next;
        }
        levels
    }
}

pub struct SponsorChain<'a> {
    forest: &'a ReferralForest,
    cursor: AccountId,
    remaining: usize,
}

impl<'a> Iterator for SponsorChain<'a> {
    type Item = AccountId;

    fn next(&mut self) -> Option<AccountId> {
        if self.remaining == 0 {
            return None;
        }
        let parent = self.forest.sponsors.get(&self.cursor)?.clone();
        self.remaining -= 1;
        self.cursor = parent.clone();
        Some(parent)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TeamLevel {
    pub level: u32,
    pub members: Vec<AccountId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forest_chain(ids: &[&str]) -> ReferralForest {
        // ids[0] is the root; each id sponsors the next.
        let mut forest = ReferralForest::new();
        let mut code = forest.enroll(&ids[0].to_string(), None).unwrap();
        for id in &ids[1..] {
            code = forest.enroll(&id.to_string(), Some(&code)).unwrap();
        }
        forest
    }

    #[test]
    fn enroll_links_sponsor_and_downline() {
        let mut forest = ReferralForest::new();
        let root_code = forest.enroll(&"root".to_string(), None).unwrap();
        forest.enroll(&"alice".to_string(), Some(&root_code)).unwrap();
        forest.enroll(&"bob".to_string(), Some(&root_code)).unwrap();
        assert_eq!(forest.sponsor_of(&"alice".into()), Some(&"root".to_string()));
        assert_eq!(forest.downline(&"root".into()), ["alice".to_string(), "bob".to_string()]);
        assert!(forest.sponsor_of(&"root".into()).is_none());
    }

    #[test]
    fn unknown_code_and_double_enroll_are_rejected() {
        let mut forest = ReferralForest::new();
        forest.enroll(&"root".to_string(), None).unwrap();
        assert!(matches!(
            forest.enroll(&"alice".to_string(), Some("NOPE1234")),
            Err(CoreError::UnknownReferralCode(_))
        ));
        assert!(matches!(
            forest.enroll(&"root".to_string(), None),
            Err(CoreError::DuplicateAccount(_))
        ));
    }

    #[test]
    fn codes_are_unique_across_accounts() {
        let mut forest = ReferralForest::new();
        let mut seen = std::collections::BTreeSet::new();
        for idx in 0..200 {
            let code = forest.enroll(&format!("acct-{idx}"), None).unwrap();
            assert_eq!(code.len(), CODE_LEN);
            assert!(seen.insert(code));
        }
    }

    #[test]
    fn sponsor_chain_is_nearest_first_and_depth_bounded() {
        let forest = forest_chain(&["l4", "l3", "l2", "l1", "origin"]);
        let chain: Vec<_> = forest.sponsor_chain(&"origin".into(), 10).collect();
        assert_eq!(chain, ["l1", "l2", "l3", "l4"]);
        let capped: Vec<_> = forest.sponsor_chain(&"origin".into(), 2).collect();
        assert_eq!(capped, ["l1", "l2"]);
        assert!(forest.sponsor_chain(&"l4".into(), 10).next().is_none());
    }

    #[test]
    fn subtree_reports_members_per_level() {
        let mut forest = ReferralForest::new();
        let root = forest.enroll(&"root".to_string(), None).unwrap();
        let a = forest.enroll(&"a".to_string(), Some(&root)).unwrap();
        forest.enroll(&"b".to_string(), Some(&root)).unwrap();
        forest.enroll(&"a1".to_string(), Some(&a)).unwrap();
        let levels = forest.subtree(&"root".into(), 5);
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].level, 1);
        assert_eq!(levels[0].members, ["a".to_string(), "b".to_string()]);
        assert_eq!(levels[1].members, ["a1".to_string()]);
        // Depth cap truncates the walk.
        assert_eq!(forest.subtree(&"root".into(), 1).len(), 1);
    }
}
