//! The fixed catalog of server-side scripts.
//!
//! Every state transition of a lock or rate limiter is a single script
//! call; the store's single-threaded script execution is what makes the
//! multi-step transitions atomic. None of these transitions may be split
//! into separate round trips.
//!
//! Scripts that return `nil` use it as a sentinel ("acquired" on the lock
//! paths, "not the owner" on the unlock paths, "granted" on the rate
//! limiter path), never as an error.

/// Acquire or re-enter the reentrant lock.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
///
/// Returns nil when acquired, otherwise the key's remaining TTL in ms.
pub const LOCK_TRY_ACQUIRE: &str = r"
if (redis.call('exists', KEYS[1]) == 0) then
    redis.call('hincrby', KEYS[1], ARGV[2], 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
if (redis.call('hexists', KEYS[1], ARGV[2]) == 1) then
    redis.call('hincrby', KEYS[1], ARGV[2], 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
return redis.call('pttl', KEYS[1]);
";

/// Release one level of the reentrant lock.
///
/// KEYS\[1\] = lock hash key
/// KEYS\[2\] = channel key
/// ARGV\[1\] = unlock message
/// ARGV\[2\] = lease in milliseconds
/// ARGV\[3\] = owner tag
///
/// Returns nil when the owner tag holds nothing, 0 when a reentrant level
/// remains, 1 when the lock was fully released and the channel notified.
pub const LOCK_UNLOCK: &str = r"
if (redis.call('hexists', KEYS[1], ARGV[3]) == 0) then
    return nil;
end;
local counter = redis.call('hincrby', KEYS[1], ARGV[3], -1);
if (counter > 0) then
    redis.call('pexpire', KEYS[1], ARGV[2]);
    return 0;
end;
redis.call('del', KEYS[1]);
redis.call('publish', KEYS[2], ARGV[1]);
return 1;
";

/// Refresh the reentrant lock's lease while the owner tag is present.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
///
/// Returns 1 if the lease was refreshed, 0 if the owner is gone.
pub const LOCK_RENEW: &str = r"
if (redis.call('hexists', KEYS[1], ARGV[2]) == 1) then
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return 1;
end;
return 0;
";

/// Acquire the non-reentrant mutex (conditional string set).
///
/// KEYS\[1\] = mutex key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
///
/// Returns nil when acquired, otherwise the key's remaining TTL in ms.
pub const MUTEX_TRY_ACQUIRE: &str = r"
if (redis.call('setnx', KEYS[1], ARGV[2]) == 1) then
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
return redis.call('pttl', KEYS[1]);
";

/// Release the mutex if the stored value matches the owner tag.
///
/// KEYS\[1\] = mutex key
/// KEYS\[2\] = channel key
/// ARGV\[1\] = unlock message
/// ARGV\[2\] = lease in milliseconds (unused, kept for a uniform call shape)
/// ARGV\[3\] = owner tag
pub const MUTEX_UNLOCK: &str = r"
local val = redis.call('get', KEYS[1]);
if (val ~= ARGV[3]) then
    return nil;
end;
redis.call('del', KEYS[1]);
redis.call('publish', KEYS[2], ARGV[1]);
return 1;
";

/// Refresh the mutex lease while the key exists.
///
/// KEYS\[1\] = mutex key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag (unused, kept for a uniform call shape)
pub const MUTEX_RENEW: &str = r"
if (redis.call('exists', KEYS[1]) == 1) then
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return 1;
end;
return 0;
";

/// Acquire or re-enter the read side of the read/write lock.
///
/// The lock hash holds a `mode` field (`read` or `write`), one counter
/// field per reading owner, and `<owner>:write` for the writer. A writer
/// may take the read lock (downgrade path); readers admit readers.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
pub const READ_TRY_ACQUIRE: &str = r"
local mode = redis.call('hget', KEYS[1], 'mode');
if (mode == false) then
    redis.call('hset', KEYS[1], 'mode', 'read');
    redis.call('hincrby', KEYS[1], ARGV[2], 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
if (mode == 'read') or (redis.call('hexists', KEYS[1], ARGV[2] .. ':write') == 1) then
    redis.call('hincrby', KEYS[1], ARGV[2], 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
return redis.call('pttl', KEYS[1]);
";

/// Release one level of the read lock.
///
/// KEYS\[1\] = lock hash key
/// KEYS\[2\] = channel key
/// ARGV\[1\] = read unlock message
/// ARGV\[2\] = lease in milliseconds
/// ARGV\[3\] = owner tag
pub const READ_UNLOCK: &str = r"
if (redis.call('hexists', KEYS[1], ARGV[3]) == 0) then
    return nil;
end;
local counter = redis.call('hincrby', KEYS[1], ARGV[3], -1);
if (counter == 0) then
    redis.call('hdel', KEYS[1], ARGV[3]);
end;
if (redis.call('hlen', KEYS[1]) > 1) then
    redis.call('pexpire', KEYS[1], ARGV[2]);
    return 0;
end;
redis.call('del', KEYS[1]);
redis.call('publish', KEYS[2], ARGV[1]);
return 1;
";

/// Refresh the read lock's lease while the owner still holds read levels.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
pub const READ_RENEW: &str = r"
if (redis.call('hexists', KEYS[1], ARGV[2]) == 1) then
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return 1;
end;
return 0;
";

/// Acquire or re-enter the write side of the read/write lock.
///
/// Exclusive against readers and other writers; reentrant for its owner.
/// Taking the write lock while only holding the read lock (upgrade) is
/// refused.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
pub const WRITE_TRY_ACQUIRE: &str = r"
local mode = redis.call('hget', KEYS[1], 'mode');
if (mode == false) then
    redis.call('hset', KEYS[1], 'mode', 'write');
    redis.call('hincrby', KEYS[1], ARGV[2] .. ':write', 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
if (mode == 'write') and (redis.call('hexists', KEYS[1], ARGV[2] .. ':write') == 1) then
    redis.call('hincrby', KEYS[1], ARGV[2] .. ':write', 1);
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return nil;
end;
return redis.call('pttl', KEYS[1]);
";

/// Release one level of the write lock.
///
/// When the final write level is released and the owner's read counters
/// remain (a downgrade), the mode flips to `read` instead of deleting the
/// key, so the owner's readers stay valid.
///
/// KEYS\[1\] = lock hash key
/// KEYS\[2\] = channel key
/// ARGV\[1\] = unlock message
/// ARGV\[2\] = lease in milliseconds
/// ARGV\[3\] = owner tag
pub const WRITE_UNLOCK: &str = r"
local mode = redis.call('hget', KEYS[1], 'mode');
if (mode ~= 'write') then
    return nil;
end;
local writeField = ARGV[3] .. ':write';
if (redis.call('hexists', KEYS[1], writeField) == 0) then
    return nil;
end;
local counter = redis.call('hincrby', KEYS[1], writeField, -1);
if (counter > 0) then
    redis.call('pexpire', KEYS[1], ARGV[2]);
    return 0;
end;
redis.call('hdel', KEYS[1], writeField);
if (redis.call('hlen', KEYS[1]) == 1) then
    redis.call('del', KEYS[1]);
    redis.call('publish', KEYS[2], ARGV[1]);
else
    redis.call('hset', KEYS[1], 'mode', 'read');
    redis.call('pexpire', KEYS[1], ARGV[2]);
end;
return 1;
";

/// Refresh the write lock's lease while the owner still holds it.
///
/// KEYS\[1\] = lock hash key
/// ARGV\[1\] = lease in milliseconds
/// ARGV\[2\] = owner tag
pub const WRITE_RENEW: &str = r"
if (redis.call('hexists', KEYS[1], ARGV[2] .. ':write') == 1) then
    redis.call('pexpire', KEYS[1], ARGV[1]);
    return 1;
end;
return 0;
";

/// Initialise the rate limiter's configuration only if unset.
///
/// KEYS\[1\] = config hash key
/// ARGV\[1\] = rate, ARGV\[2\] = interval ms, ARGV\[3\] = type (0|1)
///
/// Returns 1 iff this call performed the write.
pub const RATE_TRY_SET: &str = r"
redis.call('hsetnx', KEYS[1], 'rate', ARGV[1]);
redis.call('hsetnx', KEYS[1], 'interval', ARGV[2]);
return redis.call('hsetnx', KEYS[1], 'type', ARGV[3]);
";

/// Overwrite the rate limiter's configuration and reset its state.
///
/// KEYS\[1\] = config hash key
/// KEYS\[2\] = value key, KEYS\[3\] = permits key
/// ARGV\[1\] = rate, ARGV\[2\] = interval ms, ARGV\[3\] = type (0|1)
pub const RATE_SET: &str = r"
redis.call('hset', KEYS[1], 'rate', ARGV[1]);
redis.call('hset', KEYS[1], 'interval', ARGV[2]);
redis.call('hset', KEYS[1], 'type', ARGV[3]);
redis.call('del', KEYS[2], KEYS[3]);
";

/// Try to take permits from the token bucket.
///
/// Sweeps members older than one interval out of the permits set, refills
/// the value key (capped at `rate` minus the still-outstanding members),
/// then either records the grant or computes the wait. The returned delay
/// is biased 3 ms past the window boundary so a prompt retry lands after
/// the oldest permit has expired.
///
/// KEYS\[1\] = config hash key
/// KEYS\[2\] = shared value key,   KEYS\[3\] = per-client value key
/// KEYS\[4\] = shared permits key, KEYS\[5\] = per-client permits key
/// ARGV\[1\] = requested permits
/// ARGV\[2\] = current time in milliseconds
/// ARGV\[3\] = permit nonce (hex)
///
/// Returns nil when granted, otherwise the retry delay in ms.
pub const RATE_TRY_ACQUIRE: &str = r"
local rate = redis.call('hget', KEYS[1], 'rate');
local interval = redis.call('hget', KEYS[1], 'interval');
local type = redis.call('hget', KEYS[1], 'type');
assert(rate ~= false and interval ~= false and type ~= false, 'RateLimiter is not initialized');

local valueName = KEYS[2];
local permitsName = KEYS[4];
if type == '1' then
    valueName = KEYS[3];
    permitsName = KEYS[5];
end;

assert(tonumber(rate) >= tonumber(ARGV[1]), 'Requested permits amount could not exceed defined rate');

local currentValue = redis.call('get', valueName);
local res;
if currentValue ~= false then
    local expiredValues = redis.call('zrangebyscore', permitsName, 0, tonumber(ARGV[2]) - interval);
    local released = 0;
    for i, v in ipairs(expiredValues) do
        local random, permits = struct.unpack('Bc0I', v);
        released = released + permits;
    end;

    if released > 0 then
        redis.call('zremrangebyscore', permitsName, 0, tonumber(ARGV[2]) - interval);
        if tonumber(currentValue) + released > tonumber(rate) then
            currentValue = tonumber(rate) - redis.call('zcard', permitsName);
        else
            currentValue = tonumber(currentValue) + released;
        end;
        redis.call('set', valueName, currentValue);
    end;

    if tonumber(currentValue) < tonumber(ARGV[1]) then
        local firstValue = redis.call('zrange', permitsName, 0, 0, 'withscores');
        res = 3 + interval - (tonumber(ARGV[2]) - tonumber(firstValue[2]));
    else
        redis.call('zadd', permitsName, ARGV[2], struct.pack('Bc0I', string.len(ARGV[3]), ARGV[3], ARGV[1]));
        redis.call('decrby', valueName, ARGV[1]);
        res = nil;
    end;
else
    redis.call('set', valueName, rate);
    redis.call('zadd', permitsName, ARGV[2], struct.pack('Bc0I', string.len(ARGV[3]), ARGV[3], ARGV[1]));
    redis.call('decrby', valueName, ARGV[1]);
    res = nil;
end;

local ttl = redis.call('pttl', KEYS[1]);
if ttl > 0 then
    redis.call('pexpire', valueName, ttl);
    redis.call('pexpire', permitsName, ttl);
end;
return res;
";

/// Sweep expired permits and return the current available count.
///
/// The sweep is a required side effect: without it a quiescent limiter
/// would accumulate dead members forever.
///
/// KEYS as in [`RATE_TRY_ACQUIRE`]; ARGV\[1\] = current time in ms.
pub const RATE_AVAILABLE: &str = r"
local rate = redis.call('hget', KEYS[1], 'rate');
local interval = redis.call('hget', KEYS[1], 'interval');
local type = redis.call('hget', KEYS[1], 'type');
assert(rate ~= false and interval ~= false and type ~= false, 'RateLimiter is not initialized');

local valueName = KEYS[2];
local permitsName = KEYS[4];
if type == '1' then
    valueName = KEYS[3];
    permitsName = KEYS[5];
end;

local currentValue = redis.call('get', valueName);
if currentValue == false then
    redis.call('set', valueName, rate);
    return rate;
end;

local expiredValues = redis.call('zrangebyscore', permitsName, 0, tonumber(ARGV[1]) - interval);
local released = 0;
for i, v in ipairs(expiredValues) do
    local random, permits = struct.unpack('Bc0I', v);
    released = released + permits;
end;

if released > 0 then
    redis.call('zremrangebyscore', permitsName, 0, tonumber(ARGV[1]) - interval);
    currentValue = tonumber(currentValue) + released;
    redis.call('set', valueName, currentValue);
end;

return currentValue;
";

/// Atomic compare-and-set for the integer counter, treating a missing key
/// as zero.
///
/// KEYS\[1\] = counter key; ARGV\[1\] = expected, ARGV\[2\] = new value.
pub const ATOMIC_LONG_CAS: &str = r"
local currValue = redis.call('get', KEYS[1]);
if currValue == ARGV[1]
     or (tonumber(ARGV[1]) == 0 and currValue == false) then
    redis.call('set', KEYS[1], ARGV[2]);
    return 1;
end;
return 0;
";

/// Atomic compare-and-set for the float counter. Comparison is numeric so
/// that formatting differences do not matter.
///
/// KEYS\[1\] = counter key; ARGV\[1\] = expected, ARGV\[2\] = new value.
pub const ATOMIC_DOUBLE_CAS: &str = r"
local value = redis.call('get', KEYS[1]);
if (value == false and tonumber(ARGV[1]) == 0) or (tonumber(value) == tonumber(ARGV[1])) then
    redis.call('set', KEYS[1], ARGV[2]);
    return 1;
end;
return 0;
";

/// Read and delete a counter in one step. Returns the old value or nil.
///
/// KEYS\[1\] = counter key.
pub const ATOMIC_GET_AND_DELETE: &str = r"
local currValue = redis.call('get', KEYS[1]);
redis.call('del', KEYS[1]);
return currValue;
";

/// Apply a relative expiry to every key of an instance's family.
///
/// KEYS = the key family; ARGV\[1\] = TTL in milliseconds.
///
/// Returns 1 if at least one key accepted the expiry.
pub const EXPIRE: &str = r"
local result = 0;
for j = 1, #KEYS, 1 do
    if redis.call('pexpire', KEYS[j], ARGV[1]) == 1 then
        result = 1;
    end;
end;
return result;
";

/// Apply an absolute expiry to every key of an instance's family.
///
/// KEYS = the key family; ARGV\[1\] = Unix time in milliseconds.
pub const EXPIRE_AT: &str = r"
local result = 0;
for j = 1, #KEYS, 1 do
    if redis.call('pexpireat', KEYS[j], ARGV[1]) == 1 then
        result = 1;
    end;
end;
return result;
";

/// Remove the expiry from every key of an instance's family.
///
/// KEYS = the key family.
pub const CLEAR_EXPIRE: &str = r"
local result = 0;
for j = 1, #KEYS, 1 do
    if redis.call('persist', KEYS[j]) == 1 then
        result = 1;
    end;
end;
return result;
";
