//! Binding to the VVFX real-time voice conversion runtime.
//!
//! The runtime is a plain DLL exporting `__stdcall` functions that return an
//! `int` status (zero is success). Every entry point is resolved once at load
//! time; a missing export fails the load.

use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};

use windows::core::*;
use windows::Win32::Foundation::*;
use windows::Win32::System::LibraryLoader::*;

use rtvc_core::engine::transform::{EngineFault, EngineResult, TransformEngine};
use rtvc_core::models::audio_models::Version;
use rtvc_core::models::error::VoiceChangerError;

/// Runtime location relative to the Common Files directory or the host module.
pub const VVFX_FILE: &str = r"VVFX\rtvc.vvfx";

const DEFAULT_COMMON_FILES: &str = r"C:\Program Files\Common Files";

/// Status reported when the runtime returns an unusable value.
const STATUS_BAD_VALUE: i32 = -1;

type GetVersionFn = unsafe extern "system" fn(*mut i32, *mut i32, *mut i32) -> i32;
type InitFn = unsafe extern "system" fn(*const c_char) -> i32;
type DestroyFn = unsafe extern "system" fn() -> i32;
type ProcessFn = unsafe extern "system" fn(i32, *const f32, *const f32, *mut f32) -> i32;
type GetIntFn = unsafe extern "system" fn(*mut i32) -> i32;
type GetNameFn = unsafe extern "system" fn(i32, *mut *const c_char) -> i32;
type SetVoiceFn = unsafe extern "system" fn(i32) -> i32;
type SetVoicesFn = unsafe extern "system" fn(i32, *const i32, *const f32) -> i32;

struct EntryPoints {
    get_protocol_version: GetVersionFn,
    init: InitFn,
    destroy: DestroyFn,
    process: ProcessFn,
    get_version: GetVersionFn,
    get_sample_rate: GetIntFn,
    get_sample_latency: GetIntFn,
    get_block_size: GetIntFn,
    get_num_params: GetIntFn,
    get_param_name: GetNameFn,
    get_num_voices: GetIntFn,
    get_voice_name: GetNameFn,
    set_voice: SetVoiceFn,
    set_voices: SetVoicesFn,
}

/// Resolve one export and reinterpret it with its real signature.
///
/// # Safety
/// `F` must be the exported function's exact signature.
unsafe fn resolve<F: Copy>(module: HMODULE, name: &'static CStr) -> std::result::Result<F, VoiceChangerError> {
    let proc = GetProcAddress(module, PCSTR(name.as_ptr() as *const u8)).ok_or_else(|| {
        VoiceChangerError::InitializationFault(format!(
            "could not find {} function",
            name.to_string_lossy()
        ))
    })?;
    Ok(std::mem::transmute_copy::<_, F>(&proc))
}

impl EntryPoints {
    unsafe fn load(module: HMODULE) -> std::result::Result<Self, VoiceChangerError> {
        Ok(Self {
            get_protocol_version: resolve(module, c"get_protocol_version")?,
            init: resolve(module, c"init")?,
            destroy: resolve(module, c"destroy")?,
            process: resolve(module, c"process")?,
            get_version: resolve(module, c"get_version")?,
            get_sample_rate: resolve(module, c"get_sample_rate")?,
            get_sample_latency: resolve(module, c"get_sample_latency")?,
            get_block_size: resolve(module, c"get_block_size")?,
            get_num_params: resolve(module, c"get_num_params")?,
            get_param_name: resolve(module, c"get_param_name")?,
            get_num_voices: resolve(module, c"get_num_voices")?,
            get_voice_name: resolve(module, c"get_voice_name")?,
            set_voice: resolve(module, c"set_voice")?,
            set_voices: resolve(module, c"set_voices")?,
        })
    }
}

/// The VVFX runtime, loaded for the lifetime of this value.
pub struct VvfxEngine {
    entry: EntryPoints,
    module: HMODULE,
    path: PathBuf,
}

// SAFETY: the module handle is only used to free the library on drop, and the
// runtime's entry points may be called from any thread.
unsafe impl Send for VvfxEngine {}
unsafe impl Sync for VvfxEngine {}

impl VvfxEngine {
    /// Load from `%CommonProgramFiles%\VVFX\rtvc.vvfx`, falling back to
    /// `VVFX\rtvc.vvfx` next to the module containing this code.
    pub fn load() -> std::result::Result<Self, VoiceChangerError> {
        let common = std::env::var_os("CommonProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COMMON_FILES));

        match Self::load_from(&common.join(VVFX_FILE)) {
            Ok(engine) => Ok(engine),
            Err(first) => {
                log::warn!("{}", first);
                let local = host_module_dir()?.join(VVFX_FILE);
                Self::load_from(&local)
            }
        }
    }

    pub fn load_from(path: &Path) -> std::result::Result<Self, VoiceChangerError> {
        let wide = HSTRING::from(path);
        unsafe {
            let module = LoadLibraryW(&wide).map_err(|e| {
                VoiceChangerError::InitializationFault(format!("could not load {}: {}", path.display(), e))
            })?;
            match EntryPoints::load(module) {
                Ok(entry) => {
                    log::info!("loaded {}", path.display());
                    Ok(Self {
                        entry,
                        module,
                        path: path.to_path_buf(),
                    })
                }
                Err(e) => {
                    let _ = FreeLibrary(module);
                    Err(e)
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_version(f: GetVersionFn, call: &'static str) -> EngineResult<Version> {
        let (mut major, mut minor, mut revision) = (0, 0, 0);
        EngineFault::check(call, unsafe { f(&mut major, &mut minor, &mut revision) })?;
        Ok(Version { major, minor, revision })
    }

    fn read_int(f: GetIntFn, call: &'static str) -> EngineResult<i32> {
        let mut value = 0;
        EngineFault::check(call, unsafe { f(&mut value) })?;
        Ok(value)
    }

    fn read_count(f: GetIntFn, call: &'static str) -> EngineResult<usize> {
        usize::try_from(Self::read_int(f, call)?).map_err(|_| EngineFault::new(call, STATUS_BAD_VALUE))
    }

    fn read_name(f: GetNameFn, call: &'static str, index: usize) -> EngineResult<String> {
        let index = i32::try_from(index).map_err(|_| EngineFault::new(call, STATUS_BAD_VALUE))?;
        let mut name: *const c_char = std::ptr::null();
        EngineFault::check(call, unsafe { f(index, &mut name) })?;
        if name.is_null() {
            return Err(EngineFault::new(call, STATUS_BAD_VALUE));
        }
        // SAFETY: the runtime returns a NUL-terminated string it owns.
        Ok(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
    }
}

impl TransformEngine for VvfxEngine {
    fn protocol_version(&self) -> EngineResult<Version> {
        Self::read_version(self.entry.get_protocol_version, "get_protocol_version")
    }

    fn init(&self, model: &str) -> EngineResult<()> {
        let model = CString::new(model).map_err(|_| EngineFault::new("init", STATUS_BAD_VALUE))?;
        EngineFault::check("init", unsafe { (self.entry.init)(model.as_ptr()) })
    }

    fn destroy(&self) -> EngineResult<()> {
        EngineFault::check("destroy", unsafe { (self.entry.destroy)() })
    }

    fn version(&self) -> EngineResult<Version> {
        Self::read_version(self.entry.get_version, "get_version")
    }

    fn sample_rate(&self) -> EngineResult<u32> {
        let rate = Self::read_int(self.entry.get_sample_rate, "get_sample_rate")?;
        u32::try_from(rate).map_err(|_| EngineFault::new("get_sample_rate", STATUS_BAD_VALUE))
    }

    fn sample_latency(&self) -> EngineResult<u32> {
        let latency = Self::read_int(self.entry.get_sample_latency, "get_sample_latency")?;
        u32::try_from(latency).map_err(|_| EngineFault::new("get_sample_latency", STATUS_BAD_VALUE))
    }

    fn block_size(&self) -> EngineResult<usize> {
        Self::read_count(self.entry.get_block_size, "get_block_size")
    }

    fn param_count(&self) -> EngineResult<usize> {
        Self::read_count(self.entry.get_num_params, "get_num_params")
    }

    fn param_name(&self, index: usize) -> EngineResult<String> {
        Self::read_name(self.entry.get_param_name, "get_param_name", index)
    }

    fn voice_count(&self) -> EngineResult<usize> {
        Self::read_count(self.entry.get_num_voices, "get_num_voices")
    }

    fn voice_name(&self, index: usize) -> EngineResult<String> {
        Self::read_name(self.entry.get_voice_name, "get_voice_name", index)
    }

    fn select_voice(&self, id: i32) -> EngineResult<()> {
        EngineFault::check("set_voice", unsafe { (self.entry.set_voice)(id) })
    }

    fn select_voices(&self, ids: &[i32], weights: &[f32]) -> EngineResult<()> {
        if ids.len() != weights.len() {
            return Err(EngineFault::new("set_voices", STATUS_BAD_VALUE));
        }
        let count = i32::try_from(ids.len()).map_err(|_| EngineFault::new("set_voices", STATUS_BAD_VALUE))?;
        EngineFault::check("set_voices", unsafe {
            (self.entry.set_voices)(count, ids.as_ptr(), weights.as_ptr())
        })
    }

    fn transform(&self, params: &[f32], block: &mut [f32]) -> EngineResult<()> {
        let count = i32::try_from(params.len()).map_err(|_| EngineFault::new("process", STATUS_BAD_VALUE))?;
        // in place: input and output are the same block
        let samples = block.as_mut_ptr();
        EngineFault::check("process", unsafe {
            (self.entry.process)(count, params.as_ptr(), samples as *const f32, samples)
        })
    }
}

impl Drop for VvfxEngine {
    fn drop(&mut self) {
        if let Err(e) = unsafe { FreeLibrary(self.module) } {
            log::warn!("failed to free {}: {}", self.path.display(), e);
        }
    }
}

/// Directory of the module (DLL or executable) this code is linked into.
fn host_module_dir() -> std::result::Result<PathBuf, VoiceChangerError> {
    static ANCHOR: u8 = 0;
    let fault = |detail: String| VoiceChangerError::InitializationFault(format!("could not locate host module: {}", detail));

    unsafe {
        let mut module = HMODULE::default();
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(&ANCHOR as *const u8 as *const u16),
            &mut module,
        )
        .map_err(|e| fault(e.to_string()))?;

        let mut buffer = vec![0u16; MAX_PATH as usize];
        loop {
            let len = GetModuleFileNameW(Some(module), &mut buffer) as usize;
            if len == 0 {
                return Err(fault(format!("GetModuleFileNameW failed ({})", GetLastError().0)));
            }
            if len < buffer.len() {
                let path = PathBuf::from(String::from_utf16_lossy(&buffer[..len]));
                return path
                    .parent()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| fault(path.display().to_string()));
            }
            buffer.resize(buffer.len() * 2, 0);
        }
    }
}
