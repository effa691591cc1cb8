// Raw signatures of the tdjson C ABI, resolved at runtime by `library`.
use libc::{c_char, c_double, c_int, c_void};

pub const TD_JSON_CLIENT_CREATE: &[u8] = b"td_json_client_create\0";
pub const TD_JSON_CLIENT_SEND: &[u8] = b"td_json_client_send\0";
pub const TD_JSON_CLIENT_RECEIVE: &[u8] = b"td_json_client_receive\0";
pub const TD_JSON_CLIENT_EXECUTE: &[u8] = b"td_json_client_execute\0";
pub const TD_JSON_CLIENT_DESTROY: &[u8] = b"td_json_client_destroy\0";

pub const TD_CREATE_CLIENT_ID: &[u8] = b"td_create_client_id\0";
pub const TD_SEND: &[u8] = b"td_send\0";
pub const TD_RECEIVE: &[u8] = b"td_receive\0";
pub const TD_EXECUTE: &[u8] = b"td_execute\0";

pub const TD_SET_LOG_MESSAGE_CALLBACK: &[u8] = b"td_set_log_message_callback\0";
pub const TD_SET_LOG_FATAL_ERROR_CALLBACK: &[u8] = b"td_set_log_fatal_error_callback\0";

pub type JsonClientCreateFn = unsafe extern "C" fn() -> *mut c_void;
pub type JsonClientSendFn = unsafe extern "C" fn(client: *mut c_void, request: *const c_char);
pub type JsonClientReceiveFn =
    unsafe extern "C" fn(client: *mut c_void, timeout: c_double) -> *const c_char;
pub type JsonClientExecuteFn =
    unsafe extern "C" fn(client: *mut c_void, request: *const c_char) -> *const c_char;
pub type JsonClientDestroyFn = unsafe extern "C" fn(client: *mut c_void);

pub type CreateClientIdFn = unsafe extern "C" fn() -> c_int;
pub type SendFn = unsafe extern "C" fn(client_id: c_int, request: *const c_char);
pub type ReceiveFn = unsafe extern "C" fn(timeout: c_double) -> *const c_char;
pub type ExecuteFn = unsafe extern "C" fn(request: *const c_char) -> *const c_char;

pub type LogMessageCallbackPtr =
    Option<extern "C" fn(verbosity_level: c_int, message: *const c_char)>;
pub type SetLogMessageCallbackFn =
    unsafe extern "C" fn(max_verbosity_level: c_int, callback: LogMessageCallbackPtr);

pub type LogFatalErrorCallbackPtr = Option<extern "C" fn(error_message: *const c_char)>;
pub type SetLogFatalErrorCallbackFn = unsafe extern "C" fn(callback: LogFatalErrorCallbackPtr);
