//! Trampoline Generator
//!
//! A [`Trampoline`] is a callable bound to one native address, one calling
//! convention, one pass mode and one signature. Everything is decided when
//! it is built: the arity table below yields a single monomorphised invoker
//! for the requested (convention, pass mode) pair, and calling the
//! trampoline jumps straight through it.
//!
//! # Safety
//!
//! The generator guarantees that what the slot declares is what gets
//! transmitted. It cannot check that the native function agrees; a
//! mismatch is undefined behaviour at the native boundary.

use std::fmt;
use std::mem;

use crate::error::{CalliError, CalliResult};
use crate::types::{Address, CallingConvention, NativeReturn, NativeValue, PassMode, Signature, ValueKind};

/// Monomorphised call path for one argument tuple and return type.
pub type Invoker<Args, R> = unsafe fn(Address, Args) -> R;

/// An argument tuple a trampoline can forward: `()`, `(A,)` ... up to eight
/// [`NativeValue`]s.
pub trait NativeArgs: Sized + 'static {
    /// Semantic types of the tuple, in declaration order
    fn kinds() -> Vec<ValueKind>;

    /// Select the call path for a convention and pass mode
    fn invoker<R: NativeReturn>(
        convention: CallingConvention,
        pass_mode: PassMode,
    ) -> Invoker<Self, R>;
}

/// ABIs this target can express.
#[derive(Debug, Clone, Copy)]
enum Abi {
    C,
    System,
    #[cfg(target_arch = "x86")]
    StdCall,
}

fn abi(convention: CallingConvention) -> Abi {
    match convention {
        CallingConvention::C => Abi::C,
        CallingConvention::System => Abi::System,
        #[cfg(target_arch = "x86")]
        CallingConvention::StdCall => Abi::StdCall,
        // stdcall only differs from the platform convention on x86
        #[cfg(not(target_arch = "x86"))]
        CallingConvention::StdCall => Abi::System,
    }
}

/// Only 32- and 64-bit native addresses are supported.
pub(crate) fn check_pointer_width(bits: u32) -> CalliResult<()> {
    match bits {
        32 | 64 => Ok(()),
        other => Err(CalliError::UnsupportedPlatform {
            pointer_width: other,
        }),
    }
}

/// Reinterpret a native address as a function pointer type.
///
/// # Safety
///
/// `F` must be a function pointer type matching the code at `address`.
#[inline(always)]
unsafe fn cast<F: Copy>(address: Address) -> F {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<usize>());
    mem::transmute_copy::<usize, F>(&address.get())
}

macro_rules! invoker {
    ($abi:tt, by_value; $($ty:ident $val:ident),*) => {{
        unsafe fn call<R, $($ty),*>(address: Address, ($($val,)*): ($($ty,)*)) -> R {
            let target: extern $abi fn($($ty),*) -> R = cast(address);
            target($($val),*)
        }
        call::<R, $($ty),*> as Invoker<($($ty,)*), R>
    }};
    ($abi:tt, by_reference; $($ty:ident $val:ident),*) => {{
        #[allow(unused_mut)]
        unsafe fn call<R, $($ty),*>(address: Address, ($(mut $val,)*): ($($ty,)*)) -> R {
            let target: extern $abi fn($(*mut $ty),*) -> R = cast(address);
            target($(&mut $val as *mut $ty),*)
        }
        call::<R, $($ty),*> as Invoker<($($ty,)*), R>
    }};
}

macro_rules! native_args {
    ($($ty:ident $val:ident),*) => {
        impl<$($ty: NativeValue),*> NativeArgs for ($($ty,)*) {
            fn kinds() -> Vec<ValueKind> {
                vec![$(<$ty as NativeValue>::KIND),*]
            }

            fn invoker<R: NativeReturn>(
                convention: CallingConvention,
                pass_mode: PassMode,
            ) -> Invoker<Self, R> {
                match (abi(convention), pass_mode) {
                    (Abi::C, PassMode::ByValue) => invoker!("C", by_value; $($ty $val),*),
                    (Abi::C, PassMode::ByReference) => invoker!("C", by_reference; $($ty $val),*),
                    (Abi::System, PassMode::ByValue) => invoker!("system", by_value; $($ty $val),*),
                    (Abi::System, PassMode::ByReference) => {
                        invoker!("system", by_reference; $($ty $val),*)
                    }
                    #[cfg(target_arch = "x86")]
                    (Abi::StdCall, PassMode::ByValue) => invoker!("stdcall", by_value; $($ty $val),*),
                    #[cfg(target_arch = "x86")]
                    (Abi::StdCall, PassMode::ByReference) => {
                        invoker!("stdcall", by_reference; $($ty $val),*)
                    }
                }
            }
        }
    };
}

native_args!();
native_args!(A a);
native_args!(A a, B b);
native_args!(A a, B b, C c);
native_args!(A a, B b, C c, D d);
native_args!(A a, B b, C c, D d, E e);
native_args!(A a, B b, C c, D d, E e, F f);
native_args!(A a, B b, C c, D d, E e, F f, G g);
native_args!(A a, B b, C c, D d, E e, F f, G g, H h);

/// A callable bound to a fixed native address
pub struct Trampoline<Args, R> {
    address: Address,
    convention: CallingConvention,
    pass_mode: PassMode,
    signature: Signature,
    invoker: Invoker<Args, R>,
}

impl<Args: NativeArgs, R: NativeReturn> Trampoline<Args, R> {
    /// Build a trampoline for `address`.
    ///
    /// `signature` must describe `Args -> R`; the pair is checked once here
    /// and never again per call.
    pub fn build(
        address: Address,
        convention: CallingConvention,
        pass_mode: PassMode,
        signature: &Signature,
    ) -> CalliResult<Self> {
        check_pointer_width(usize::BITS)?;
        signature.validate()?;

        let expected = Signature::of::<Args, R>();
        if *signature != expected {
            return Err(CalliError::SignatureMismatch {
                expected,
                found: signature.clone(),
            });
        }

        let invoker = Args::invoker::<R>(convention, pass_mode);

        Ok(Self {
            address,
            convention,
            pass_mode,
            signature: expected,
            invoker,
        })
    }

    /// Transfer control to the native function.
    ///
    /// # Safety
    ///
    /// The function at [`address`](Self::address) must have the declared
    /// signature and calling convention, and must be safe to call with
    /// `args` (for [`PassMode::ByReference`], with pointers to them).
    #[inline]
    pub unsafe fn call(&self, args: Args) -> R {
        (self.invoker)(self.address, args)
    }
}

impl<Args, R> Trampoline<Args, R> {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn convention(&self) -> CallingConvention {
        self.convention
    }

    pub fn pass_mode(&self) -> PassMode {
        self.pass_mode
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }
}

impl<Args, R> fmt::Debug for Trampoline<Args, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trampoline")
            .field("address", &self.address)
            .field("convention", &self.convention)
            .field("pass_mode", &self.pass_mode)
            .field("signature", &self.signature.to_string())
            .finish()
    }
}
