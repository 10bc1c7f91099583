use anyhow::Result;
use async_trait::async_trait;
use std::net::Ipv4Addr;

use super::types::IpamAddress;
use crate::error::ProvisionError;
use crate::models::MgmtAddress;

/// Address-management operations the run depends on
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn first_free(&self, subnet_id: &str) -> Result<Ipv4Addr>;
    async fn subnet_addresses(&self, subnet_id: &str) -> Result<Vec<Ipv4Addr>>;
    async fn reserve_first_free(&self, subnet_id: &str, label: &str) -> Result<Ipv4Addr>;
    async fn search_hostname(&self, needle: &str) -> Result<Vec<IpamAddress>>;
    async fn set_hostname(&self, address_id: &str, hostname: &str) -> Result<()>;
}

/// Addresses in one mgmt block
pub const BLOCK_SIZE: u32 = 4;

/// A freshly reserved /30 and the Telco address inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgmtBlock {
    pub base: Ipv4Addr,
    pub mgmt: MgmtAddress,
}

/// Check that `first_free` starts a /30 and that the rest of the block is unused
pub fn check_block(first_free: Ipv4Addr, existing: &[Ipv4Addr]) -> Result<(), ProvisionError> {
    if u32::from(first_free) % BLOCK_SIZE != 0 {
        return Err(ProvisionError::MisalignedBlock { first_free });
    }

    let base = u32::from(first_free);
    for offset in 1..BLOCK_SIZE {
        let addr = Ipv4Addr::from(base + offset);
        if existing.contains(&addr) {
            return Err(ProvisionError::BlockNotFree { first_free, occupied: addr });
        }
    }

    Ok(())
}

/// Reserve the first free /30 of the mgmt subnet under `label`.
/// Nothing is reserved unless the whole block passes [`check_block`].
pub async fn reserve_mgmt_block<B: AddressBook + ?Sized>(
    book: &B,
    subnet_id: &str,
    label: &str,
) -> Result<MgmtBlock, ProvisionError> {
    let first_free = book
        .first_free(subnet_id)
        .await
        .map_err(ProvisionError::external("first free mgmt IP lookup"))?;
    tracing::info!("First available mgmt IP is {}", first_free);

    // Alignment is checked before pulling the whole subnet
    if u32::from(first_free) % BLOCK_SIZE != 0 {
        return Err(ProvisionError::MisalignedBlock { first_free });
    }

    let existing = book
        .subnet_addresses(subnet_id)
        .await
        .map_err(ProvisionError::external("mgmt subnet address listing"))?;
    check_block(first_free, &existing)?;

    for _ in 0..BLOCK_SIZE {
        let reserved = book
            .reserve_first_free(subnet_id, label)
            .await
            .map_err(|e| ProvisionError::ReservationFailed(format!("{:#}", e)))?;
        tracing::info!("Reserved IP {} with hostname '{}'", reserved, label);
    }

    Ok(MgmtBlock {
        base: first_free,
        mgmt: MgmtAddress::from_block_base(first_free),
    })
}

/// Addresses whose hostname is exactly `label`. The IPAM search is a substring
/// match, so `TAG 12` also returns the records of `TAG 123`.
async fn labelled<B: AddressBook + ?Sized>(
    book: &B,
    label: &str,
) -> Result<Vec<IpamAddress>, ProvisionError> {
    let found = book
        .search_hostname(label)
        .await
        .map_err(ProvisionError::external("mgmt IP search"))?;
    let total = found.len();

    let exact: Vec<IpamAddress> = found
        .into_iter()
        .filter(|a| a.hostname.as_deref() == Some(label))
        .collect();
    if exact.len() != total {
        tracing::debug!("Ignoring {} addresses that only contain '{}'", total - exact.len(), label);
    }
    Ok(exact)
}

/// Find the Telco mgmt address among the addresses labelled for an inventory number
pub async fn lookup_mgmt_address<B: AddressBook + ?Sized>(
    book: &B,
    label: &str,
    inventory_number: &str,
) -> Result<MgmtAddress, ProvisionError> {
    labelled(book, label)
        .await?
        .iter()
        .map(|a| a.ip)
        .find(|ip| MgmtAddress::is_telco_slot(*ip))
        .map(MgmtAddress::new)
        .ok_or_else(|| ProvisionError::NoMgmtAddress {
            inventory_number: inventory_number.to_string(),
        })
}

/// Rename the four addresses labelled `label` to `new_hostname`.
/// Nothing is renamed unless exactly one whole block carries the label.
pub async fn relabel_mgmt_block<B: AddressBook + ?Sized>(
    book: &B,
    label: &str,
    new_hostname: &str,
) -> Result<usize, ProvisionError> {
    let addresses = labelled(book, label).await?;

    if addresses.len() != BLOCK_SIZE as usize {
        return Err(ProvisionError::InventoryUpdate(format!(
            "expected {} addresses labelled '{}', found {}",
            BLOCK_SIZE,
            label,
            addresses.len()
        )));
    }

    tracing::info!(
        "Found {} IPs matching '{}': {:?}",
        addresses.len(),
        label,
        addresses.iter().map(|a| a.ip).collect::<Vec<_>>()
    );

    for address in &addresses {
        book.set_hostname(&address.id, new_hostname)
            .await
            .map_err(|e| ProvisionError::InventoryUpdate(format!("{:#}", e)))?;
        tracing::info!("Updated description in IPAM for {} ({})", address.id, address.ip);
    }

    Ok(addresses.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory IPAM subnet
    struct FakeBook {
        first_free: Ipv4Addr,
        existing: Vec<IpamAddress>,
        reserved: Mutex<Vec<String>>,
        renamed: Mutex<Vec<(String, String)>>,
        fail_patch: bool,
    }

    impl FakeBook {
        fn new(first_free: &str, existing: &[&str]) -> Self {
            Self {
                first_free: first_free.parse().unwrap(),
                existing: Vec::new(),
                reserved: Mutex::new(Vec::new()),
                renamed: Mutex::new(Vec::new()),
                fail_patch: false,
            }
            .labelled("Telco Inventory TAG 1234", existing)
        }

        /// Add IPAM records carrying `label`
        fn labelled(mut self, label: &str, ips: &[&str]) -> Self {
            for ip in ips {
                self.existing.push(IpamAddress {
                    id: (100 + self.existing.len()).to_string(),
                    ip: ip.parse().unwrap(),
                    hostname: Some(label.to_string()),
                });
            }
            self
        }

        fn reservations(&self) -> usize {
            self.reserved.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AddressBook for FakeBook {
        async fn first_free(&self, _subnet_id: &str) -> Result<Ipv4Addr> {
            Ok(self.first_free)
        }

        async fn subnet_addresses(&self, _subnet_id: &str) -> Result<Vec<Ipv4Addr>> {
            Ok(self.existing.iter().map(|a| a.ip).collect())
        }

        async fn reserve_first_free(&self, _subnet_id: &str, label: &str) -> Result<Ipv4Addr> {
            let mut reserved = self.reserved.lock().unwrap();
            reserved.push(label.to_string());
            Ok(Ipv4Addr::from(u32::from(self.first_free) + reserved.len() as u32 - 1))
        }

        async fn search_hostname(&self, needle: &str) -> Result<Vec<IpamAddress>> {
            Ok(self
                .existing
                .iter()
                .filter(|a| a.hostname.as_deref().unwrap_or("").contains(needle))
                .cloned()
                .collect())
        }

        async fn set_hostname(&self, address_id: &str, hostname: &str) -> Result<()> {
            if self.fail_patch {
                return Err(anyhow::anyhow!("status code 500"));
            }
            self.renamed
                .lock()
                .unwrap()
                .push((address_id.to_string(), hostname.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_check_block_alignment() {
        for last in [1u8, 2, 3, 5, 6, 7, 9, 254, 255] {
            let first = Ipv4Addr::new(10, 254, 3, last);
            assert!(matches!(
                check_block(first, &[]),
                Err(ProvisionError::MisalignedBlock { .. })
            ));
        }
        assert!(check_block(Ipv4Addr::new(10, 254, 3, 8), &[]).is_ok());
        assert!(check_block(Ipv4Addr::new(10, 254, 4, 0), &[]).is_ok());
    }

    #[test]
    fn test_check_block_followers() {
        let first = Ipv4Addr::new(10, 254, 3, 8);
        for last in [9u8, 10, 11] {
            let taken = Ipv4Addr::new(10, 254, 3, last);
            match check_block(first, &[taken]) {
                Err(ProvisionError::BlockNotFree { occupied, .. }) => assert_eq!(occupied, taken),
                other => panic!("expected BlockNotFree, got {:?}", other),
            }
        }
        // Neighbouring blocks do not matter
        let neighbours = [Ipv4Addr::new(10, 254, 3, 7), Ipv4Addr::new(10, 254, 3, 12)];
        assert!(check_block(first, &neighbours).is_ok());
    }

    #[tokio::test]
    async fn test_reserve_misaligned_reserves_nothing() {
        let book = FakeBook::new("10.254.3.9", &[]);
        let err = reserve_mgmt_block(&book, "7", "Telco Inventory TAG 1").await.unwrap_err();
        assert!(matches!(err, ProvisionError::MisalignedBlock { .. }));
        assert_eq!(book.reservations(), 0);
    }

    #[tokio::test]
    async fn test_reserve_occupied_block_reserves_nothing() {
        let book = FakeBook::new("10.254.3.8", &["10.254.3.10"]);
        let err = reserve_mgmt_block(&book, "7", "Telco Inventory TAG 1").await.unwrap_err();
        assert!(matches!(err, ProvisionError::BlockNotFree { .. }));
        assert_eq!(book.reservations(), 0);
    }

    #[tokio::test]
    async fn test_reserve_free_block() {
        let book = FakeBook::new("10.254.3.8", &["10.254.3.4", "10.254.3.7"]);
        let block = reserve_mgmt_block(&book, "7", "Telco Inventory TAG 1").await.unwrap();
        assert_eq!(book.reservations(), 4);
        assert_eq!(block.base, Ipv4Addr::new(10, 254, 3, 8));
        assert_eq!(block.mgmt.telco, Ipv4Addr::new(10, 254, 3, 10));
        assert_eq!(block.mgmt.gateway, Ipv4Addr::new(10, 254, 3, 9));
    }

    #[tokio::test]
    async fn test_lookup_picks_telco_slot() {
        let book = FakeBook::new(
            "10.254.9.0",
            &["10.254.3.8", "10.254.3.9", "10.254.3.10", "10.254.3.11"],
        );
        let mgmt = lookup_mgmt_address(&book, "Telco Inventory TAG 1234", "1234").await.unwrap();
        assert_eq!(mgmt.telco, Ipv4Addr::new(10, 254, 3, 10));
        assert_eq!(mgmt.gateway, Ipv4Addr::new(10, 254, 3, 9));
    }

    #[tokio::test]
    async fn test_lookup_without_match() {
        let book = FakeBook::new("10.254.9.0", &[]);
        let err = lookup_mgmt_address(&book, "Telco Inventory TAG 9", "9").await.unwrap_err();
        assert!(matches!(err, ProvisionError::NoMgmtAddress { .. }));
    }

    const BLOCK_1234: [&str; 4] = ["10.254.3.8", "10.254.3.9", "10.254.3.10", "10.254.3.11"];

    /// Telco 123 and Telco 12 share a label prefix
    fn colliding_labels() -> FakeBook {
        FakeBook::new("10.254.9.0", &[])
            .labelled("Telco Inventory TAG 123", &BLOCK_1234)
            .labelled(
                "Telco Inventory TAG 12",
                &["10.254.3.12", "10.254.3.13", "10.254.3.14", "10.254.3.15"],
            )
    }

    #[tokio::test]
    async fn test_lookup_ignores_longer_labels() {
        let book = colliding_labels();
        let mgmt = lookup_mgmt_address(&book, "Telco Inventory TAG 12", "12").await.unwrap();
        assert_eq!(mgmt.telco, Ipv4Addr::new(10, 254, 3, 14));
        assert_eq!(mgmt.gateway, Ipv4Addr::new(10, 254, 3, 13));

        let book = FakeBook::new("10.254.9.0", &[]).labelled("Telco Inventory TAG 123", &BLOCK_1234);
        let err = lookup_mgmt_address(&book, "Telco Inventory TAG 12", "12").await.unwrap_err();
        assert!(matches!(err, ProvisionError::NoMgmtAddress { .. }));
    }

    #[tokio::test]
    async fn test_relabel_touches_only_own_block() {
        let book = colliding_labels();
        let count = relabel_mgmt_block(&book, "Telco Inventory TAG 12", "PON-1 - Acme - DIA")
            .await
            .unwrap();
        assert_eq!(count, 4);
        let renamed = book.renamed.lock().unwrap();
        let ids: Vec<&str> = renamed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["104", "105", "106", "107"]);
    }

    #[tokio::test]
    async fn test_relabel_all_addresses() {
        let book = FakeBook::new("10.254.9.0", &BLOCK_1234);
        let count = relabel_mgmt_block(&book, "Telco Inventory TAG 1234", "PON-1 - Acme - DIA")
            .await
            .unwrap();
        assert_eq!(count, 4);
        let renamed = book.renamed.lock().unwrap();
        assert!(renamed.iter().all(|(_, h)| h == "PON-1 - Acme - DIA"));
    }

    #[tokio::test]
    async fn test_relabel_needs_whole_block() {
        let book = FakeBook::new("10.254.9.0", &["10.254.3.8", "10.254.3.9", "10.254.3.10"]);
        let err = relabel_mgmt_block(&book, "Telco Inventory TAG 1234", "x").await.unwrap_err();
        assert!(matches!(err, ProvisionError::InventoryUpdate(_)));
        assert!(book.renamed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relabel_failure_is_inventory_update() {
        let mut book = FakeBook::new("10.254.9.0", &BLOCK_1234);
        book.fail_patch = true;
        let err = relabel_mgmt_block(&book, "Telco Inventory TAG 1234", "x").await.unwrap_err();
        assert!(matches!(err, ProvisionError::InventoryUpdate(_)));
    }
}
