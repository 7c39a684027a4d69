//! C callbacks handed to the component at instantiation.

use std::{
    ffi::{c_void, CStr},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tandem_core::{CallbackSink, LogMessage, Status};

use crate::{
    ffi::{fmi2CallbackFunctions, fmi2ComponentEnvironment, fmi2Status, fmi2String},
    memory,
};

/// Data reachable from the component through `componentEnvironment`.
pub(crate) struct CallbackContext {
    pub instance_name: String,
    pub sink: Arc<dyn CallbackSink>,
}

/// Builds the callback record pointing at `context`.
///
/// Both boxes must outlive the native instance.
pub(crate) fn callback_functions(context: &CallbackContext) -> Box<fmi2CallbackFunctions> {
    Box::new(fmi2CallbackFunctions {
        logger,
        allocateMemory: allocate_memory,
        freeMemory: free_memory,
        stepFinished: Some(step_finished),
        componentEnvironment: std::ptr::from_ref(context).cast_mut().cast(),
    })
}

unsafe fn string_or_empty(s: fmi2String) -> String {
    if s.is_null() {
        String::new()
    } else {
        // SAFETY: the component passes null-terminated strings.
        unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned()
    }
}

unsafe extern "C" fn logger(
    env: fmi2ComponentEnvironment,
    instance_name: fmi2String,
    status: fmi2Status,
    category: fmi2String,
    message: fmi2String,
) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if env.is_null() {
            return;
        }
        // SAFETY: `env` is the context registered at instantiation, which the
        // adapter keeps alive until after the instance is freed.
        let context = unsafe { &*env.cast::<CallbackContext>() };
        let instance = unsafe { string_or_empty(instance_name) };
        let message = LogMessage {
            instance: if instance.is_empty() {
                context.instance_name.clone()
            } else {
                instance
            },
            status: Status::from_raw(status).unwrap_or(Status::Error),
            category: unsafe { string_or_empty(category) },
            message: unsafe { string_or_empty(message) },
        };
        context.sink.log(&message);
    }));
}

unsafe extern "C" fn step_finished(env: fmi2ComponentEnvironment, status: fmi2Status) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if env.is_null() {
            return;
        }
        // SAFETY: see `logger`.
        let context = unsafe { &*env.cast::<CallbackContext>() };
        context
            .sink
            .step_finished(Status::from_raw(status).unwrap_or(Status::Error));
    }));
}

extern "C" fn allocate_memory(count: usize, size: usize) -> *mut c_void {
    memory::calloc(count, size)
}

unsafe extern "C" fn free_memory(block: *mut c_void) {
    // SAFETY: the component only frees blocks it obtained from `allocate_memory`.
    unsafe { memory::free(block) };
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::ffi::CString;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<LogMessage>>);

    impl CallbackSink for Collect {
        fn log(&self, message: &LogMessage) {
            self.0.lock().push(message.clone());
        }
    }

    #[test]
    fn logger_forwards_format_string_to_sink() {
        let sink = Arc::new(Collect::default());
        let context = CallbackContext {
            instance_name: "ball".into(),
            sink: sink.clone(),
        };
        let functions = callback_functions(&context);

        let category = CString::new("logEvents").unwrap();
        let message = CString::new("bounce at %g").unwrap();
        unsafe {
            (functions.logger)(
                functions.componentEnvironment,
                std::ptr::null(),
                1,
                category.as_ptr(),
                message.as_ptr(),
            );
        }

        let logged = sink.0.lock();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].instance, "ball");
        assert_eq!(logged[0].status, Status::Warning);
        assert_eq!(logged[0].message, "bounce at %g");
    }

    #[test]
    fn memory_callbacks_round_trip() {
        let context = CallbackContext {
            instance_name: "m".into(),
            sink: Arc::new(Collect::default()),
        };
        let functions = callback_functions(&context);
        let block = (functions.allocateMemory)(3, 4);
        assert!(!block.is_null());
        unsafe { (functions.freeMemory)(block) };
    }
}
