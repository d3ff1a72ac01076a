#[cfg(windows)]
use windows::core::{PCWSTR, PWSTR};

pub fn compute_aligned_size(size: u64, alignment: u64) -> u64 {
    (size + (alignment - 1)) & !(alignment - 1)
}

/// Owned null-terminated UTF-16 string. D3D12 keeps raw PCWSTR pointers in
/// descs until the call returns, so the backing storage must stay alive and
/// unmoved for at least that long.
#[cfg(windows)]
pub struct WideString(Vec<u16>);

#[cfg(windows)]
impl WideString {
    pub fn new(s: &str) -> Self {
        Self(s.encode_utf16().chain(std::iter::once(0)).collect())
    }

    pub fn pcwstr(&self) -> PCWSTR {
        PCWSTR(self.0.as_ptr())
    }

    /// For APIs declared over mutable strings that never actually write,
    /// like the DXC argument list.
    pub fn pwstr(&self) -> PWSTR {
        PWSTR(self.0.as_ptr() as *mut u16)
    }
}

#[test]
fn test_aligned_size() {
    assert_eq!(compute_aligned_size(0, 32), 0);
    assert_eq!(compute_aligned_size(1, 32), 32);
    assert_eq!(compute_aligned_size(32, 32), 32);
    assert_eq!(compute_aligned_size(40, 32), 64);
    assert_eq!(compute_aligned_size(704, 64), 704);

    // Constant buffer sizes round up to the 256 byte placement alignment.
    assert_eq!(compute_aligned_size(48, 256), 256);
    assert_eq!(compute_aligned_size(256, 256), 256);
    assert_eq!(compute_aligned_size(260, 256), 512);
}
