//! Capture endpoint enumeration via the MMDevice API.
//!
//! Wraps `IMMDeviceEnumerator` to list active capture endpoints in
//! collection order. The position in that collection is the device index the
//! host stores in its settings.

use windows::core::*;
use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use rtvc_core::models::audio_models::DeviceDescriptor;
use rtvc_core::models::error::VoiceChangerError;

/// Audio device enumerator using the Windows MMDevice API.
pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Create a new device enumerator.
    ///
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> std::result::Result<Self, VoiceChangerError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| VoiceChangerError::DeviceUnavailable(format!("failed to create enumerator: {}", e)))?;
            Ok(Self { enumerator })
        }
    }

    /// Active capture endpoints.
    pub fn list_capture_devices(&self) -> std::result::Result<Vec<DeviceDescriptor>, VoiceChangerError> {
        unsafe {
            let collection = self.active_capture_collection()?;
            let count = collection
                .GetCount()
                .map_err(|e| VoiceChangerError::DeviceError(format!("GetCount failed: {}", e)))?;

            let default_id = self
                .enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .ok()
                .and_then(|d| device_id(&d));

            let mut devices = Vec::with_capacity(count as usize);
            for i in 0..count {
                let device = match collection.Item(i) {
                    Ok(d) => d,
                    Err(e) => {
                        log::warn!("skipping capture endpoint {}: {}", i, e);
                        continue;
                    }
                };

                let id = device_id(&device).unwrap_or_default();
                let name = friendly_name(&device).unwrap_or_else(|| format!("Device {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());

                devices.push(DeviceDescriptor {
                    index: i as i32,
                    name,
                    id,
                    is_default,
                });
            }

            Ok(devices)
        }
    }

    /// The endpoint at `index` in the active capture collection.
    pub fn capture_device(&self, index: i32) -> std::result::Result<IMMDevice, VoiceChangerError> {
        let unavailable = |detail: String| {
            VoiceChangerError::DeviceUnavailable(format!("capture device {}: {}", index, detail))
        };
        let index = u32::try_from(index).map_err(|_| unavailable("negative index".into()))?;

        unsafe {
            let collection = self.active_capture_collection()?;
            collection.Item(index).map_err(|e| unavailable(e.to_string()))
        }
    }

    unsafe fn active_capture_collection(&self) -> std::result::Result<IMMDeviceCollection, VoiceChangerError> {
        self.enumerator
            .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
            .map_err(|e| VoiceChangerError::DeviceUnavailable(format!("EnumAudioEndpoints failed: {}", e)))
    }
}

/// Endpoint id string, freeing the COM allocation.
pub(crate) fn device_id(device: &IMMDevice) -> Option<String> {
    unsafe {
        let raw = device.GetId().ok()?;
        let id = raw.to_string().ok();
        CoTaskMemFree(Some(raw.0 as *const _));
        id
    }
}

/// Read `PKEY_Device_FriendlyName` from the endpoint's property store.
pub(crate) fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;
        let value = store.GetValue(&PKEY_Device_FriendlyName).ok()?;
        let name = value.to_string();
        (!name.is_empty()).then_some(name)
    }
}
