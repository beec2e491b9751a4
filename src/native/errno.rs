//! Thread-local `errno` shared by the native libraries that report through it

use std::cell::Cell;

pub const ENOENT: i32 = 2;
pub const EIO: i32 = 5;
pub const ENOMEM: i32 = 12;
pub const EACCES: i32 = 13;
pub const EBUSY: i32 = 16;
pub const EEXIST: i32 = 17;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;

thread_local! {
    static ERRNO: Cell<i32> = const { Cell::new(0) };
}

pub fn errno() -> i32 {
    ERRNO.with(Cell::get)
}

pub fn set_errno(code: i32) {
    ERRNO.with(|e| e.set(code));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_is_per_thread() {
        set_errno(EBUSY);
        let other = std::thread::spawn(|| {
            set_errno(EINVAL);
            errno()
        })
        .join()
        .unwrap();
        assert_eq!(other, EINVAL);
        assert_eq!(errno(), EBUSY);
    }
}
