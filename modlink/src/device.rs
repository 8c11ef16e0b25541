use std::collections::BTreeMap;

mod object_ids {
    pub(crate) const VENDOR_NAME: u8 = 0x00;
    pub(crate) const PRODUCT_CODE: u8 = 0x01;
    pub(crate) const MAJOR_MINOR_REVISION: u8 = 0x02;
    pub(crate) const VENDOR_URL: u8 = 0x03;
    pub(crate) const PRODUCT_NAME: u8 = 0x04;
    pub(crate) const MODEL_NAME: u8 = 0x05;
    pub(crate) const USER_APPLICATION_NAME: u8 = 0x06;
}

/// Read device id code, i.e. which block of identification objects to read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceIdCategory {
    /// mandatory objects 0x00 - 0x02, stream access
    Basic = 0x01,
    /// optional objects 0x03 - 0x7F, stream access
    Regular = 0x02,
    /// private objects 0x80 - 0xFF, stream access
    Extended = 0x03,
    /// one specific object
    Individual = 0x04,
}

impl std::fmt::Display for DeviceIdCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceIdCategory::Basic => f.write_str("basic"),
            DeviceIdCategory::Regular => f.write_str("regular"),
            DeviceIdCategory::Extended => f.write_str("extended"),
            DeviceIdCategory::Individual => f.write_str("individual"),
        }
    }
}

/// One page of a device identification reply, as found on the wire
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdentificationRaw {
    /// raw read device id code echoed by the device
    pub category: u8,
    /// raw conformity level reported by the device
    pub conformity_level: u8,
    /// top bit of the conformity level: the device supports individual access
    pub individual_access_allowed: bool,
    /// the device has more objects than fit into this page
    pub more_requests_needed: bool,
    /// object id at which the next page starts
    pub next_object_id: u8,
    /// the objects contained in this page
    pub objects: BTreeMap<u8, Vec<u8>>,
}

/// Device identification merged across all pages
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdentification {
    /// the device supports reading individual objects
    pub is_individual_access_allowed: bool,
    /// object 0x00
    pub vendor_name: Option<String>,
    /// object 0x01
    pub product_code: Option<String>,
    /// object 0x02
    pub major_minor_revision: Option<String>,
    /// object 0x03
    pub vendor_url: Option<String>,
    /// object 0x04
    pub product_name: Option<String>,
    /// object 0x05
    pub model_name: Option<String>,
    /// object 0x06
    pub user_application_name: Option<String>,
    /// all objects with an id of 0x07 and above
    pub extended_objects: BTreeMap<u8, Vec<u8>>,
}

impl DeviceIdentification {
    pub(crate) fn merge(&mut self, page: DeviceIdentificationRaw) {
        self.is_individual_access_allowed |= page.individual_access_allowed;

        for (id, value) in page.objects {
            let field = match id {
                object_ids::VENDOR_NAME => &mut self.vendor_name,
                object_ids::PRODUCT_CODE => &mut self.product_code,
                object_ids::MAJOR_MINOR_REVISION => &mut self.major_minor_revision,
                object_ids::VENDOR_URL => &mut self.vendor_url,
                object_ids::PRODUCT_NAME => &mut self.product_name,
                object_ids::MODEL_NAME => &mut self.model_name,
                object_ids::USER_APPLICATION_NAME => &mut self.user_application_name,
                _ => {
                    self.extended_objects.insert(id, value);
                    continue;
                }
            };
            *field = Some(String::from_utf8_lossy(&value).into_owned());
        }
    }
}

impl std::fmt::Display for DeviceIdentification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let named = [
            ("vendor name", &self.vendor_name),
            ("product code", &self.product_code),
            ("revision", &self.major_minor_revision),
            ("vendor url", &self.vendor_url),
            ("product name", &self.product_name),
            ("model name", &self.model_name),
            ("user application name", &self.user_application_name),
        ];
        write!(
            f,
            "individual access: {}",
            self.is_individual_access_allowed
        )?;
        for (name, value) in named {
            if let Some(value) = value {
                write!(f, "\n{name}: {value}")?;
            }
        }
        for (id, value) in &self.extended_objects {
            write!(f, "\nobject {id:#04X}: {} bytes", value.len())?;
        }
        Ok(())
    }
}
