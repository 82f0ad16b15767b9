//! Saved addresses and the address form.
//!
//! Addresses live only on this device under the `shoplane_user_addresses`
//! cache key, newest first. Choosing one for delivery writes it to
//! `shippingAddress`, where checkout picks it up.

use std::sync::Arc;

use shoplane_core::{Address, AddressError, AddressId, AddressKind, Phone, Pincode};
use thiserror::Error;
use tracing::instrument;

use crate::cache::{CacheError, LocalCache, LocalCacheExt, keys};
use crate::notify::Notifier;
use crate::services::postal::PostalLookup;

#[derive(Debug, Error)]
pub enum AddressBookError {
    #[error(transparent)]
    Invalid(#[from] AddressError),

    #[error("select an address first")]
    NothingSelected,

    #[error("no saved address with id {0}")]
    Unknown(AddressId),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

// =============================================================================
// Draft form
// =============================================================================

/// What happened to a keystroke in the pincode field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PincodeInput {
    /// Not a digit prefix; the field keeps its previous value.
    Rejected,
    /// Accepted but not yet six digits. No lookup was made.
    Partial,
    /// Six digits, and city and state were filled in.
    Resolved,
    /// Six digits, but the lookup failed. City and state are unchanged.
    LookupFailed,
}

/// The "new address" form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressDraft {
    pub name: String,
    pub phone: String,
    pub pincode: String,
    pub locality: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub kind: AddressKind,
}

impl AddressDraft {
    /// Feed the pincode field, looking the place up once six digits are in.
    #[instrument(skip(self, postal, notifier))]
    pub async fn set_pincode(
        &mut self,
        postal: &dyn PostalLookup,
        notifier: &Notifier,
        input: &str,
    ) -> PincodeInput {
        if !Pincode::is_partial(input) {
            return PincodeInput::Rejected;
        }
        input.clone_into(&mut self.pincode);

        let Ok(pincode) = Pincode::parse(input) else {
            return PincodeInput::Partial;
        };

        match postal.lookup(&pincode).await {
            Ok(place) => {
                self.city = place.city;
                self.state = place.state;
                notifier.success("Location data synced");
                PincodeInput::Resolved
            }
            Err(e) => {
                tracing::debug!(error = %e, "pincode lookup failed");
                notifier.error("Invalid pincode");
                PincodeInput::LookupFailed
            }
        }
    }

    /// Validate the form into an address with a fresh local id.
    ///
    /// # Errors
    ///
    /// Returns the first field that fails validation.
    pub fn into_address(self) -> Result<Address, AddressError> {
        let required = [
            ("name", &self.name),
            ("locality", &self.locality),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(AddressError::MissingField(*field));
        }

        Ok(Address {
            id: AddressId::new(format!("addr_{}", uuid::Uuid::new_v4().simple())),
            phone: Phone::parse(&self.phone)?,
            pincode: Pincode::parse(&self.pincode)?,
            name: self.name.trim().to_owned(),
            locality: self.locality.trim().to_owned(),
            address: self.address.trim().to_owned(),
            city: self.city,
            state: self.state,
            kind: self.kind,
        })
    }
}

// =============================================================================
// Address book
// =============================================================================

pub struct AddressBook {
    cache: Arc<dyn LocalCache>,
    notifier: Notifier,
    addresses: Vec<Address>,
    selected: Option<AddressId>,
}

impl AddressBook {
    /// Load saved addresses. The first one starts out selected.
    #[must_use]
    pub fn load(cache: Arc<dyn LocalCache>, notifier: Notifier) -> Self {
        let addresses: Vec<Address> = cache
            .get(keys::ADDRESSES)
            .ok()
            .flatten()
            .unwrap_or_default();
        let selected = addresses.first().map(|a| a.id.clone());
        Self {
            cache,
            notifier,
            addresses,
            selected,
        }
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Address> {
        let id = self.selected.as_ref()?;
        self.addresses.iter().find(|a| &a.id == id)
    }

    /// Validate and save a new address at the top of the list.
    ///
    /// # Errors
    ///
    /// Returns an error if the draft is invalid or cannot be persisted.
    pub fn save(&mut self, draft: AddressDraft) -> Result<AddressId, AddressBookError> {
        let address = draft.into_address()?;
        let id = address.id.clone();
        self.addresses.insert(0, address);
        self.persist()?;
        if self.selected.is_none() {
            self.selected = Some(id.clone());
        }
        self.notifier.success("Address saved");
        Ok(id)
    }

    /// Remove an address, clearing the selection if it was selected.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be persisted.
    pub fn delete(&mut self, id: &AddressId) -> Result<(), AddressBookError> {
        let before = self.addresses.len();
        self.addresses.retain(|a| &a.id != id);
        if self.addresses.len() == before {
            return Err(AddressBookError::Unknown(id.clone()));
        }
        self.persist()?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.notifier.info("Address removed");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`AddressBookError::Unknown`] if no such address is saved.
    pub fn select(&mut self, id: &AddressId) -> Result<(), AddressBookError> {
        if !self.addresses.iter().any(|a| &a.id == id) {
            return Err(AddressBookError::Unknown(id.clone()));
        }
        self.selected = Some(id.clone());
        Ok(())
    }

    /// Persist the selected address as the shipping address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressBookError::NothingSelected`] when nothing is selected.
    pub fn deliver_here(&self) -> Result<Address, AddressBookError> {
        let Some(address) = self.selected().cloned() else {
            self.notifier.error("Select an address first");
            return Err(AddressBookError::NothingSelected);
        };
        self.cache.set(keys::SHIPPING_ADDRESS, &address)?;
        Ok(address)
    }

    fn persist(&self) -> Result<(), CacheError> {
        self.cache.set(keys::ADDRESSES, &self.addresses)
    }
}
